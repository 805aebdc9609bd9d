//! Failure classification

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use super::errors::TransportError;

/// Reply codes meaning the credential exchange was refused
const AUTH_CODES: [u16; 3] = [530, 534, 535];

/// Reply codes meaning the destination mailbox was refused
const RECIPIENT_CODES: [u16; 3] = [550, 551, 553];

const AUTH_MARKERS: [&str; 3] = ["badcredentials", "not accepted", "username and password"];

const RECIPIENT_MARKERS: [&str; 5] = [
    "recipient",
    "mailbox unavailable",
    "user unknown",
    "no such user",
    "does not exist",
];

lazy_static! {
    // a bare 535 reply code quoted inside error text
    static ref AUTH_REPLY_CODE: Regex = Regex::new(r"\b535\b").unwrap();
}

/// Guidance shown to the operator when the server refuses the credentials
pub const AUTH_REMEDIATION: &str = "SMTP authentication failed. Check SMTP_USERNAME and \
     SMTP_PASSWORD. Providers such as Gmail require an app password, not your regular \
     account password: https://myaccount.google.com/apppasswords";

/// Actionable category of a failed send attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The server rejected the credentials
    AuthFailure,

    /// The server refused the destination address
    RecipientRejected,

    /// The per-attempt timeout elapsed
    Timeout,

    /// The server asked to try again later
    Transient,

    /// Anything else
    Unknown,
}

impl FailureKind {
    /// What the operator should do about this kind of failure, if anything specific
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            FailureKind::AuthFailure => Some(AUTH_REMEDIATION),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::AuthFailure => "authentication failure",
            FailureKind::RecipientRejected => "recipient rejected",
            FailureKind::Timeout => "timeout",
            FailureKind::Transient => "transient failure",
            FailureKind::Unknown => "unknown failure",
        };

        f.write_str(label)
    }
}

/// Map a transport error to a [`FailureKind`].
pub fn classify(error: &TransportError) -> FailureKind {
    match error {
        TransportError::Timeout(_) => FailureKind::Timeout,
        TransportError::InvalidRecipient(_) => FailureKind::RecipientRejected,
        TransportError::Rejected { code, message } => classify_reply(*code, message),
        TransportError::UnknownError(err) => {
            let text = format!("{err:#}");

            if AUTH_REPLY_CODE.is_match(&text) || contains_any(&text, &AUTH_MARKERS) {
                FailureKind::AuthFailure
            } else {
                FailureKind::Unknown
            }
        }
    }
}

fn classify_reply(code: u16, message: &str) -> FailureKind {
    if RECIPIENT_CODES.contains(&code) {
        return FailureKind::RecipientRejected;
    }

    if AUTH_CODES.contains(&code) {
        return FailureKind::AuthFailure;
    }

    // the code alone is ambiguous from here on
    if code >= 500 && contains_any(message, &RECIPIENT_MARKERS) {
        return FailureKind::RecipientRejected;
    }

    if contains_any(message, &AUTH_MARKERS) {
        return FailureKind::AuthFailure;
    }

    if (400..500).contains(&code) {
        return FailureKind::Transient;
    }

    FailureKind::Unknown
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    let text = text.to_lowercase();

    markers.iter().any(|marker| text.contains(marker))
}
