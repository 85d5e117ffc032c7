//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Operator notices and command replies go through these wrappers so that a
//! transient network failure does not lose them. Relay deliveries do not:
//! they have their own rate-limit handling in the core.

use crate::config::{
    TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
};
use anyhow::Result;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message};
use teloxide::RequestError;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::{Retry, RetryIf};
use tracing::warn;

/// Execute a Telegram API operation with exponential backoff and jitter.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter) // Add jitter to prevent thundering herd
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

/// Whether a request error is worth retrying.
///
/// API errors (bad chat, missing rights) will fail the same way again.
#[must_use]
pub const fn is_retryable(error: &RequestError) -> bool {
    matches!(
        error,
        RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_)
    )
}

/// Send a message with automatic retry on network failures.
///
/// # Arguments
///
/// * `bot` - The Telegram bot instance
/// * `chat_id` - Target chat ID
/// * `text` - Message text to send
///
/// # Returns
///
/// The sent [`Message`] on success, or an error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
) -> Result<Message> {
    let text = text.into();
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    RetryIf::spawn(
        retry_strategy,
        || async {
            let sent = bot.send_message(chat_id, text.clone()).await;
            if let Err(RequestError::RetryAfter(wait)) = &sent {
                tokio::time::sleep(wait.duration()).await;
            }
            sent
        },
        is_retryable,
    )
    .await
    .map_err(|e| {
        warn!("Telegram send to {} failed: {}", chat_id, e);
        anyhow::anyhow!("Telegram send error: {e}")
    })
}
