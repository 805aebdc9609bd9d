//! Recipient list storage

pub mod file;
