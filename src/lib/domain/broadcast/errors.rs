//! Transport errors

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a single send attempt
#[derive(Debug, Error)]
pub enum TransportError {
    /// The attempt did not finish within the configured timeout
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The server answered with a negative reply
    #[error("server replied {code}: {message}")]
    Rejected {
        /// The three digit SMTP reply code
        code: u16,

        /// The reply text
        message: String,
    },

    /// The recipient could not be put on an envelope
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

impl TransportError {
    /// The SMTP reply code, if the server sent one
    pub fn code(&self) -> Option<u16> {
        match self {
            TransportError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}
