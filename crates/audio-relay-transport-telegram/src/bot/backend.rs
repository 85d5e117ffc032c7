//! `teloxide` implementations of the relay backend traits.

use crate::bot::convert::relay_message_from;
use crate::bot::resilient::send_message_resilient;
use async_trait::async_trait;
use std::future::Future;
use audio_relay_core::backend::{Forwarder, HistorySource, Notifier};
use audio_relay_core::error::{BackendError, DeliveryError};
use audio_relay_core::message::RelayMessage;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::{ApiError, RequestError};
use tracing::{debug, warn};

/// Map a request error to the relay's delivery error taxonomy.
#[must_use]
pub fn classify_request_error(error: RequestError) -> DeliveryError {
    match error {
        RequestError::RetryAfter(wait) => DeliveryError::RateLimited(wait.duration()),
        RequestError::Api(ApiError::InvalidToken) | RequestError::Network(_) => {
            DeliveryError::Fatal(error.to_string())
        }
        other => DeliveryError::Transient(other.to_string()),
    }
}

/// Forwards source messages into the destination chat.
pub struct TelegramForwarder {
    bot: Bot,
    dest: ChatId,
}

impl TelegramForwarder {
    /// Forwarder targeting `dest`.
    #[must_use]
    pub const fn new(bot: Bot, dest: ChatId) -> Self {
        Self { bot, dest }
    }
}

#[async_trait]
impl Forwarder for TelegramForwarder {
    async fn forward(&self, message: &RelayMessage) -> Result<(), DeliveryError> {
        self.bot
            .forward_message(self.dest, ChatId(message.channel_id), MessageId(message.id))
            .await
            .map(|_| ())
            .map_err(classify_request_error)
    }
}

/// Sends operator notices to the owner's private chat.
pub struct TelegramNotifier {
    bot: Bot,
    owner: ChatId,
}

impl TelegramNotifier {
    /// Notifier writing to `owner`.
    #[must_use]
    pub const fn new(bot: Bot, owner: ChatId) -> Self {
        Self { bot, owner }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), BackendError> {
        send_message_resilient(&self.bot, self.owner, text)
            .await
            .map(|_| ())
            .map_err(|e| BackendError::Request(e.to_string()))
    }
}

/// Channel history read one id at a time through a scratch chat.
///
/// Bots cannot list channel history, so each id is forwarded into a private
/// scratch chat, inspected, and the copy deleted. Ids that cannot be
/// forwarded (deleted posts, service messages) count as gaps; `gap_limit`
/// consecutive gaps end the history.
pub struct ScratchHistory {
    bot: Bot,
    scratch: ChatId,
    gap_limit: u32,
}

impl ScratchHistory {
    /// History reader copying messages into `scratch`.
    #[must_use]
    pub fn new(bot: Bot, scratch: ChatId, gap_limit: u32) -> Self {
        Self {
            bot,
            scratch,
            gap_limit: gap_limit.max(1),
        }
    }

    async fn lookup(&self, channel: ChatId, id: i32) -> Result<Option<RelayMessage>, BackendError> {
        let copy = match self
            .bot
            .forward_message(self.scratch, channel, MessageId(id))
            .disable_notification(true)
            .await
        {
            Ok(copy) => copy,
            Err(e) => return lookup_failure(id, e),
        };
        let message = relay_message_from(&copy, MessageId(id), channel);
        if let Err(e) = self.bot.delete_message(self.scratch, copy.id).await {
            warn!("Failed to delete scratch copy of {}: {}", id, e);
        }
        Ok(Some(message))
    }
}

/// Whether the API refused an id because there is nothing forwardable there.
fn is_gap(error: &ApiError) -> bool {
    match error {
        ApiError::MessageToForwardNotFound | ApiError::MessageIdInvalid => true,
        ApiError::Unknown(text) => text.contains("can't be forwarded"),
        _ => false,
    }
}

/// Sort a failed single-id lookup into a gap or a backend error.
fn lookup_failure(id: i32, error: RequestError) -> Result<Option<RelayMessage>, BackendError> {
    match error {
        RequestError::RetryAfter(wait) => Err(BackendError::RateLimited(wait.duration())),
        RequestError::Api(e) if is_gap(&e) => {
            debug!(id, "No forwardable message: {}", e);
            Ok(None)
        }
        RequestError::Api(e) => Err(BackendError::Unexpected(e.to_string())),
        other => Err(BackendError::Request(other.to_string())),
    }
}

/// Walk ids after `min_id` until `limit` messages are found or `gap_limit`
/// consecutive ids come back empty.
///
/// A rate limit after some messages were found ends the page early; the
/// caller asks again from the last id and meets the rate limit then.
async fn collect_page<F, Fut>(
    min_id: i32,
    limit: usize,
    gap_limit: u32,
    mut lookup: F,
) -> Result<Vec<RelayMessage>, BackendError>
where
    F: FnMut(i32) -> Fut,
    Fut: Future<Output = Result<Option<RelayMessage>, BackendError>>,
{
    let mut page = Vec::new();
    let mut misses = 0u32;
    let mut id = min_id;

    while page.len() < limit && misses < gap_limit {
        let Some(next) = id.checked_add(1) else {
            break;
        };
        id = next;
        match lookup(id).await {
            Ok(Some(message)) => {
                misses = 0;
                page.push(message);
            }
            Ok(None) => misses += 1,
            Err(BackendError::RateLimited(wait)) if !page.is_empty() => {
                debug!(
                    id,
                    found = page.len(),
                    "Rate limited for {}s, returning partial page",
                    wait.as_secs()
                );
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(page)
}

#[async_trait]
impl HistorySource for ScratchHistory {
    async fn fetch_after(
        &self,
        channel_id: i64,
        min_id: i32,
        limit: usize,
    ) -> Result<Vec<RelayMessage>, BackendError> {
        let channel = ChatId(channel_id);
        collect_page(min_id, limit, self.gap_limit, |id| self.lookup(channel, id)).await
    }
}
