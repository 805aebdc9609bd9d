//! Composing a broadcast from operator input

use std::{fmt, time::Duration};

use serde::Serialize;
use thiserror::Error;

use crate::domain::broadcast::{Message, DEFAULT_CONCURRENCY};

/// Shortest accepted subject, in characters
pub const MIN_SUBJECT_LENGTH: usize = 3;

/// Longest accepted subject, in characters
pub const MAX_SUBJECT_LENGTH: usize = 200;

/// Shortest accepted body, in characters
pub const MIN_BODY_LENGTH: usize = 10;

/// Longest accepted body, in characters
pub const MAX_BODY_LENGTH: usize = 50_000;

/// Lowest concurrency a draft may ask for
pub const MIN_CONCURRENCY: usize = 1;

/// Highest concurrency a draft may ask for
pub const MAX_CONCURRENCY: usize = 500;

const SPAM_TRIGGERS: [&str; 6] = [
    "free",
    "urgent",
    "act now",
    "limited time",
    "winner",
    "congratulations",
];

const SECONDS_PER_BATCH: f64 = 0.5;

/// A problem that prevents a draft from being sent
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DraftError {
    /// No subject was given
    #[error("Subject is required.")]
    MissingSubject,

    /// The subject is shorter than [`MIN_SUBJECT_LENGTH`]
    #[error("Subject must be at least 3 characters.")]
    SubjectTooShort,

    /// The subject is longer than [`MAX_SUBJECT_LENGTH`]
    #[error("Subject must be at most 200 characters.")]
    SubjectTooLong,

    /// No body was given
    #[error("Message body is required.")]
    MissingBody,

    /// The body is shorter than [`MIN_BODY_LENGTH`]
    #[error("Message must be at least 10 characters.")]
    BodyTooShort,

    /// The body is longer than [`MAX_BODY_LENGTH`]
    #[error("Message must be at most 50000 characters.")]
    BodyTooLong,

    /// The concurrency is not a whole number
    #[error("Concurrency must be a valid integer.")]
    InvalidConcurrency,
}

/// Every problem found in a draft
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "))]
pub struct DraftErrors(pub Vec<DraftError>);

/// Something worth telling the operator that does not block sending
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComposeWarning {
    /// The subject contains words that tend to trip spam filters
    SpamTriggers {
        /// The trigger words found
        words: Vec<String>,
    },

    /// The body never mentions unsubscribing
    MissingUnsubscribe,

    /// The requested concurrency was out of range and has been clamped
    ConcurrencyClamped {
        /// The value that will be used
        to: usize,
    },
}

impl fmt::Display for ComposeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComposeWarning::SpamTriggers { words } => write!(
                f,
                "Subject contains potential spam triggers: {}",
                words.join(", ")
            ),
            ComposeWarning::MissingUnsubscribe => f.write_str(
                "Consider adding an unsubscribe link to comply with email regulations",
            ),
            ComposeWarning::ConcurrencyClamped { to } if *to == MIN_CONCURRENCY => {
                write!(f, "Concurrency set to minimum value: {to}")
            }
            ComposeWarning::ConcurrencyClamped { to } => {
                write!(f, "Concurrency set to maximum value: {to}")
            }
        }
    }
}

/// Raw operator input for a broadcast
#[derive(Clone, Debug, Default)]
pub struct Draft {
    /// The subject line
    pub subject: String,

    /// The plain text body
    pub body: String,

    /// The requested concurrency, as typed
    pub concurrency: Option<String>,
}

/// A validated draft, ready to dispatch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedBroadcast {
    /// The message to send
    pub message: Message,

    /// Attempts in flight
    pub concurrency: usize,

    /// Non-blocking findings
    pub warnings: Vec<ComposeWarning>,
}

impl Draft {
    /// Validate the draft.
    ///
    /// Subject and body are trimmed. Every field is checked; all errors are
    /// returned together.
    pub fn validate(&self) -> Result<ComposedBroadcast, DraftErrors> {
        let subject = self.subject.trim();
        let body = self.body.trim();

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        match subject.chars().count() {
            0 => errors.push(DraftError::MissingSubject),
            n if n < MIN_SUBJECT_LENGTH => errors.push(DraftError::SubjectTooShort),
            n if n > MAX_SUBJECT_LENGTH => errors.push(DraftError::SubjectTooLong),
            _ => {}
        }

        let lowered = subject.to_lowercase();
        let triggers: Vec<String> = SPAM_TRIGGERS
            .iter()
            .filter(|word| lowered.contains(*word))
            .map(|word| word.to_string())
            .collect();

        if !triggers.is_empty() {
            warnings.push(ComposeWarning::SpamTriggers { words: triggers });
        }

        match body.chars().count() {
            0 => errors.push(DraftError::MissingBody),
            n if n < MIN_BODY_LENGTH => errors.push(DraftError::BodyTooShort),
            n if n > MAX_BODY_LENGTH => errors.push(DraftError::BodyTooLong),
            _ => {}
        }

        if !body.is_empty() && !body.to_lowercase().contains("unsubscribe") {
            warnings.push(ComposeWarning::MissingUnsubscribe);
        }

        let concurrency = match self.concurrency.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_CONCURRENCY,
            Some(raw) => match raw.parse::<i64>() {
                Ok(requested) if requested < MIN_CONCURRENCY as i64 => {
                    warnings.push(ComposeWarning::ConcurrencyClamped {
                        to: MIN_CONCURRENCY,
                    });
                    MIN_CONCURRENCY
                }
                Ok(requested) if requested > MAX_CONCURRENCY as i64 => {
                    warnings.push(ComposeWarning::ConcurrencyClamped {
                        to: MAX_CONCURRENCY,
                    });
                    MAX_CONCURRENCY
                }
                Ok(requested) => requested as usize,
                Err(_) => {
                    errors.push(DraftError::InvalidConcurrency);
                    DEFAULT_CONCURRENCY
                }
            },
        };

        if !errors.is_empty() {
            return Err(DraftErrors(errors));
        }

        Ok(ComposedBroadcast {
            message: Message::from_plain_text(subject, body),
            concurrency,
            warnings,
        })
    }
}

/// Rough wall-clock estimate for a broadcast: half a second per batch of
/// `concurrency` recipients.
pub fn estimate_send_time(recipients: usize, concurrency: usize) -> Duration {
    if concurrency == 0 {
        return Duration::ZERO;
    }

    Duration::from_secs_f64(recipients.div_ceil(concurrency) as f64 * SECONDS_PER_BATCH)
}
