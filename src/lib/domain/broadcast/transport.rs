//! Mail transport module

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use crate::domain::{
    broadcast::{errors::TransportError, Message},
    recipients::RecipientAddress,
};

/// Hands a message to a mail submission server, one recipient at a time.
///
/// Credentials and timeouts are fixed when the transport is constructed.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `message` to exactly one recipient.
    ///
    /// # Arguments
    /// * `message` - The [`Message`] to send.
    /// * `to` - The [`RecipientAddress`] to send it to.
    ///
    /// # Returns
    /// [`Ok`] once the server accepted the message, or the [`TransportError`] that
    /// ended the attempt. Implementations make exactly one submission attempt and
    /// never retry.
    async fn send_one(&self, message: &Message, to: &RecipientAddress)
        -> Result<(), TransportError>;
}

#[cfg(test)]
mock! {
    pub Transport {}

    #[async_trait]
    impl Transport for Transport {
        async fn send_one(&self, message: &Message, to: &RecipientAddress) -> Result<(), TransportError>;
    }
}
