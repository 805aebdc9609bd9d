//! Recipient addresses: validation, the recipient set, and list management.

mod address;
mod repository;
mod service;
mod set;
mod validator;

pub mod errors;

pub use address::{
    RecipientAddress, RecipientAddressError, DISPOSABLE_DOMAINS, MAX_ADDRESS_LENGTH,
};
pub use repository::RecipientStore;
pub use service::{MergeReport, RecipientService, RecipientServiceImpl};
pub use set::{DomainStatistics, RecipientSet};
pub use validator::{
    normalize, tokenize, validate, DisposablePolicy, InvalidRecipient, RecipientReport,
    ValidationPolicy, DEFAULT_MAX_ADDRESSES,
};

#[cfg(test)]
pub mod tests {
    pub use super::repository::MockRecipientStore;
}
