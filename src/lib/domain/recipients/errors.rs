//! Error types for recipient ingestion and storage

use std::{io, path::PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors that can occur when ingesting or editing a recipient list
#[derive(Debug, Error)]
pub enum RecipientsError {
    /// No input was provided
    #[error("Please provide at least one recipient.")]
    Empty,

    /// The input contained only separators
    #[error("No valid email addresses found.")]
    NoAddresses,

    /// The input holds more addresses than a single submission may carry
    #[error("Too many addresses. Maximum allowed: {max}, provided: {provided}")]
    TooMany {
        /// The configured maximum
        max: usize,
        /// How many addresses were provided
        provided: usize,
    },

    /// Some addresses failed validation and the caller did not override
    #[error("Invalid addresses: {0}")]
    Invalid(String),

    /// No recipient at the given position
    #[error("Invalid recipient index: {0}")]
    IndexOutOfRange(usize),

    /// The recipient list could not be loaded or saved
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by a recipient store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("could not access recipient file {}", .path.display())]
    Io {
        /// The file being accessed
        path: PathBuf,
        /// The underlying IO error
        #[source]
        source: io::Error,
    },

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

impl StoreError {
    /// Attach the path of the file being accessed to an IO error
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();

        debug!("io::Error on {} -> StoreError", path.display());

        StoreError::Io { path, source }
    }
}
