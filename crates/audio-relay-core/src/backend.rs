//! Messaging backend seams.
//!
//! The relay engine only talks to the messaging backend through these traits;
//! the Telegram transport implements them with `teloxide`.

use crate::error::{BackendError, DeliveryError};
use crate::message::RelayMessage;
use async_trait::async_trait;

/// Delivers a source message to the destination.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Forward one message. Rate limits surface as [`DeliveryError::RateLimited`].
    async fn forward(&self, message: &RelayMessage) -> Result<(), DeliveryError>;
}

/// Paginated access to channel history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Next page of messages with `id > min_id`, oldest first.
    ///
    /// An empty page means the end of history was reached.
    async fn fetch_after(
        &self,
        channel_id: i64,
        min_id: i32,
        limit: usize,
    ) -> Result<Vec<RelayMessage>, BackendError>;
}

/// Operator notification channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a plain text notice to the operator.
    async fn notify(&self, text: &str) -> Result<(), BackendError>;
}
