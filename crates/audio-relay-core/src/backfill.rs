//! Historical catch-up.
//!
//! [`backfill_stream`] turns paged history queries into a lazy stream that is
//! strictly increasing in id; [`run_backfill`] drains it through the relay,
//! checkpointing after every item so an interrupted pass resumes where it
//! stopped.

use crate::backend::{HistorySource, Notifier};
use crate::config::StartMode;
use crate::error::{BackendError, RelayError};
use crate::message::RelayMessage;
use crate::relay::{Relay, RelayOutcome};
use crate::storage::flush_or_warn;
use futures_util::stream::{self, Stream, TryStreamExt};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of messages requested per history page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// How a backfill pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillEnd {
    /// Nothing to replay for this start mode.
    Skipped,
    /// History drained.
    Completed {
        /// Items handed to the relay, whatever their outcome.
        processed: u64,
    },
    /// Operator stopped on a flood wait.
    Halted,
    /// Interrupt observed between items or while fetching history.
    Interrupted,
}

/// Where backfill starts, or `None` to skip history.
///
/// `Latest` on a channel that was never checkpointed skips history; anything
/// else resumes right after the checkpoint.
#[must_use]
pub const fn plan_backfill(mode: StartMode, checkpoint: i32) -> Option<i32> {
    match (mode, checkpoint) {
        (StartMode::Latest, 0) => None,
        _ => Some(checkpoint),
    }
}

struct Cursor {
    buffer: VecDeque<RelayMessage>,
    last_id: i32,
}

/// Lazy stream of `channel_id` history with ids greater than `after`.
///
/// Pages are fetched on demand. Messages from other channels, and ids not
/// above the last one yielded, are discarded.
pub fn backfill_stream<'a>(
    history: &'a dyn HistorySource,
    channel_id: i64,
    after: i32,
    page_size: usize,
) -> impl Stream<Item = Result<RelayMessage, BackendError>> + Send + 'a {
    let cursor = Cursor {
        buffer: VecDeque::new(),
        last_id: after,
    };
    let page_size = page_size.max(1);

    stream::try_unfold(cursor, move |mut cursor| async move {
        if cursor.buffer.is_empty() {
            let mut page = history
                .fetch_after(channel_id, cursor.last_id, page_size)
                .await?;
            page.retain(|m| m.channel_id == channel_id && m.id > cursor.last_id);
            page.sort_by_key(|m| m.id);
            page.dedup_by_key(|m| m.id);
            debug!(
                channel = channel_id,
                after = cursor.last_id,
                fetched = page.len(),
                "History page"
            );
            cursor.buffer.extend(page);
        }

        match cursor.buffer.pop_front() {
            Some(message) => {
                cursor.last_id = message.id;
                Ok(Some((message, cursor)))
            }
            None => Ok(None),
        }
    })
}

/// Replay history for one channel through the relay.
///
/// # Errors
///
/// Returns `RelayError` if the history query or a delivery fails fatally.
/// A rate-limited history query goes through the relay's rate-limit policy
/// and resumes from the checkpoint.
pub async fn run_backfill(
    relay: &Relay,
    history: &dyn HistorySource,
    notifier: &dyn Notifier,
    channel_id: i64,
    mode: StartMode,
    page_size: usize,
    cancel: &CancellationToken,
) -> Result<BackfillEnd, RelayError> {
    let checkpoint = relay.store().checkpoint(channel_id).await;
    let Some(after) = plan_backfill(mode, checkpoint) else {
        info!("START_MODE=latest → skipping backfill, only listening for new messages.");
        return Ok(BackfillEnd::Skipped);
    };

    if after == 0 {
        info!(channel = channel_id, "New channel detected → starting from scratch");
    } else {
        info!(channel = channel_id, "Resuming from id > {}", after);
    }

    let mut messages = std::pin::pin!(backfill_stream(history, channel_id, after, page_size));
    let mut processed = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                flush_or_warn(relay.store().as_ref(), "backfill interrupted").await;
                return Ok(BackfillEnd::Interrupted);
            }
            next = messages.try_next() => next,
        };
        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(BackendError::RateLimited(wait)) => {
                // The failed stream is spent; pick up again after the checkpoint.
                let resume_at = relay.store().checkpoint(channel_id).await;
                let pending = RelayMessage {
                    id: resume_at.saturating_add(1),
                    channel_id,
                    media: None,
                };
                match relay.wait_out_rate_limit(wait, &pending, cancel).await {
                    Some(RelayOutcome::Halted) => return Ok(BackfillEnd::Halted),
                    Some(_) => return Ok(BackfillEnd::Interrupted),
                    None => {}
                }
                messages.set(backfill_stream(history, channel_id, resume_at, page_size));
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        loop {
            if cancel.is_cancelled() || !relay.flow().wait_until_resumed(cancel).await {
                flush_or_warn(relay.store().as_ref(), "backfill interrupted").await;
                return Ok(BackfillEnd::Interrupted);
            }
            match relay.process(&message, cancel).await? {
                // Paused after the wait; retry the same item once resumed.
                RelayOutcome::Paused => {}
                RelayOutcome::Halted => return Ok(BackfillEnd::Halted),
                RelayOutcome::Interrupted => return Ok(BackfillEnd::Interrupted),
                _ => {
                    processed += 1;
                    break;
                }
            }
        }
    }

    flush_or_warn(relay.store().as_ref(), "backfill complete").await;
    let forwarded = relay.flow().snapshot().forwarded_count;
    info!(channel = channel_id, processed, forwarded, "Backfill complete");

    if let Err(e) = notifier
        .notify(&format!(
            "✅ Backfill completed.\nForwarded {forwarded} music messages."
        ))
        .await
    {
        warn!("Could not send backfill summary: {}", e);
    }

    Ok(BackfillEnd::Completed { processed })
}
