//! Recipient store module

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use crate::domain::recipients::{errors::StoreError, RecipientSet};

/// Durable home of the working recipient list
#[async_trait]
pub trait RecipientStore: Send + Sync + 'static {
    /// Load the stored recipient list; a store that was never written is empty
    async fn load(&self) -> Result<RecipientSet, StoreError>;

    /// Replace the stored recipient list
    async fn save(&self, recipients: &RecipientSet) -> Result<(), StoreError>;
}

#[cfg(test)]
mock! {
    pub RecipientStore {}

    #[async_trait]
    impl RecipientStore for RecipientStore {
        async fn load(&self) -> Result<RecipientSet, StoreError>;
        async fn save(&self, recipients: &RecipientSet) -> Result<(), StoreError>;
    }
}
