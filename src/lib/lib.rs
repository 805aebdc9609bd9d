#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Broadcast Studio: validate a recipient list and send one message to every
//! recipient over SMTP with bounded concurrency.

pub mod domain;
pub mod infrastructure;
