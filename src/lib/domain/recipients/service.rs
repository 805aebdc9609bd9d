//! Recipient service module

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::recipients::{
    errors::RecipientsError, normalize, RecipientAddress, RecipientReport, RecipientSet,
    RecipientStore, ValidationPolicy,
};

/// Result of merging free text into the stored list
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Addresses newly added to the list
    pub added: usize,

    /// Valid addresses that were already on the list
    pub duplicates: usize,

    /// Size of the list after merging
    pub total: usize,

    /// Validation details for the submitted text
    pub validation: RecipientReport,
}

/// Recipient list management
#[async_trait]
pub trait RecipientService: Send + Sync + 'static {
    /// Returns the stored recipient list.
    async fn list(&self) -> Result<RecipientSet, RecipientsError>;

    /// Validates `raw` and appends the addresses not yet on the list.
    ///
    /// # Arguments
    /// * `raw` - Free text holding addresses separated by commas, semicolons or whitespace.
    /// * `policy` - The [`ValidationPolicy`] to apply.
    /// * `allow_invalid` - Drop invalid entries instead of refusing the whole submission.
    ///
    /// # Returns
    /// A [`MergeReport`], or [`RecipientsError::Invalid`] if some entries were invalid and
    /// `allow_invalid` was not set. Nothing is saved when no address was added.
    async fn merge(
        &self,
        raw: &str,
        policy: &ValidationPolicy,
        allow_invalid: bool,
    ) -> Result<MergeReport, RecipientsError>;

    /// Removes the recipient at `index` and returns it.
    async fn remove(&self, index: usize) -> Result<RecipientAddress, RecipientsError>;

    /// Removes every recipient and returns how many there were.
    async fn clear(&self) -> Result<usize, RecipientsError>;
}

/// Recipient service implementation
#[derive(Debug)]
pub struct RecipientServiceImpl<S>
where
    S: RecipientStore,
{
    store: Arc<S>,

    // load-modify-save cycles must not interleave
    edit_lock: Mutex<()>,
}

impl<S> RecipientServiceImpl<S>
where
    S: RecipientStore,
{
    /// Create a new recipient service
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            edit_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl<S> RecipientService for RecipientServiceImpl<S>
where
    S: RecipientStore,
{
    async fn list(&self) -> Result<RecipientSet, RecipientsError> {
        Ok(self.store.load().await?)
    }

    async fn merge(
        &self,
        raw: &str,
        policy: &ValidationPolicy,
        allow_invalid: bool,
    ) -> Result<MergeReport, RecipientsError> {
        let validation = normalize(raw, policy)?;
        let incoming = validation.clone().into_recipients(allow_invalid)?;

        let _guard = self.edit_lock.lock().await;

        let mut recipients = self.store.load().await?;
        let added = recipients.merge(incoming.clone());

        if added > 0 {
            self.store.save(&recipients).await?;

            info!(
                "Added {} new recipients. Total: {}",
                added,
                recipients.len()
            );
        }

        Ok(MergeReport {
            added,
            duplicates: incoming.len() - added,
            total: recipients.len(),
            validation,
        })
    }

    async fn remove(&self, index: usize) -> Result<RecipientAddress, RecipientsError> {
        let _guard = self.edit_lock.lock().await;

        let mut recipients = self.store.load().await?;

        let removed = recipients
            .remove(index)
            .ok_or(RecipientsError::IndexOutOfRange(index))?;

        self.store.save(&recipients).await?;

        info!("Removed recipient: {}", removed);

        Ok(removed)
    }

    async fn clear(&self) -> Result<usize, RecipientsError> {
        let _guard = self.edit_lock.lock().await;

        let mut recipients = self.store.load().await?;
        let count = recipients.len();

        recipients.clear();
        self.store.save(&recipients).await?;

        info!("Cleared all {} recipients", count);

        Ok(count)
    }
}
