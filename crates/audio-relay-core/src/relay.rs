//! Single-message relay operation.
//!
//! Classify, dedup, deliver, record. Item-level failures end here as a
//! [`RelayOutcome`]; only errors that make the whole pipeline unusable are
//! returned as [`RelayError`].

use crate::backend::Forwarder;
use crate::classifier::is_relayable;
use crate::error::{DeliveryError, RelayError};
use crate::flow::FlowController;
use crate::message::RelayMessage;
use crate::rate_limit::{RateLimitDecision, RateLimitPolicy};
use crate::storage::{flush_or_warn, RelayStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of relaying one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Relay is paused; nothing happened.
    Paused,
    /// Not audio.
    Rejected,
    /// Content id already relayed.
    Duplicate,
    /// Delivered to the destination.
    Forwarded,
    /// Delivery failed; the item is abandoned.
    Dropped,
    /// Operator chose to stop on a flood wait; state was flushed.
    Halted,
    /// Interrupted while waiting out a flood wait; state was flushed.
    Interrupted,
}

impl RelayOutcome {
    /// Whether the item counts as processed for checkpointing.
    #[must_use]
    pub const fn is_processed(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Duplicate | Self::Forwarded | Self::Dropped
        )
    }
}

/// Relays messages to the destination.
pub struct Relay {
    forwarder: Arc<dyn Forwarder>,
    store: Arc<dyn RelayStore>,
    flow: Arc<FlowController>,
    policy: Arc<dyn RateLimitPolicy>,
    batch_size: u64,
}

impl Relay {
    /// Create a relay flushing state every `batch_size` forwards.
    #[must_use]
    pub fn new(
        forwarder: Arc<dyn Forwarder>,
        store: Arc<dyn RelayStore>,
        flow: Arc<FlowController>,
        policy: Arc<dyn RateLimitPolicy>,
        batch_size: u64,
    ) -> Self {
        Self {
            forwarder,
            store,
            flow,
            policy,
            batch_size: batch_size.max(1),
        }
    }

    /// Store shared with the rest of the pipeline.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RelayStore> {
        &self.store
    }

    /// Flow controller shared with the command surface.
    #[must_use]
    pub fn flow(&self) -> &Arc<FlowController> {
        &self.flow
    }

    /// Relay one message.
    ///
    /// The checkpoint only moves here when a batch boundary is flushed; use
    /// [`Relay::process`] to advance it for every processed item.
    ///
    /// # Errors
    ///
    /// Returns `RelayError` only for fatal delivery failures.
    pub async fn relay(
        &self,
        message: &RelayMessage,
        cancel: &CancellationToken,
    ) -> Result<RelayOutcome, RelayError> {
        if self.flow.is_paused() {
            return Ok(RelayOutcome::Paused);
        }
        if !is_relayable(message) {
            debug!(
                channel = message.channel_id,
                message_id = message.id,
                "Not audio, skipping"
            );
            return Ok(RelayOutcome::Rejected);
        }

        let unique_id = message.unique_id();
        if let Some(uid) = unique_id {
            if self.store.is_seen(uid).await {
                info!(
                    channel = message.channel_id,
                    message_id = message.id,
                    unique_id = uid,
                    "Skipping duplicate"
                );
                return Ok(RelayOutcome::Duplicate);
            }
        }

        loop {
            info!(
                channel = message.channel_id,
                message_id = message.id,
                "Forwarding..."
            );
            match self.forwarder.forward(message).await {
                Ok(()) => {
                    let total = self.flow.increment_forwarded();
                    if let Some(uid) = unique_id {
                        self.store.mark_seen(uid).await;
                    }
                    if total % self.batch_size == 0 {
                        self.store
                            .set_checkpoint(message.channel_id, message.id)
                            .await;
                        if flush_or_warn(self.store.as_ref(), "batch").await {
                            info!(
                                channel = message.channel_id,
                                message_id = message.id,
                                forwarded = total,
                                "Progress saved (batch)"
                            );
                        }
                    }
                    return Ok(RelayOutcome::Forwarded);
                }
                Err(DeliveryError::RateLimited(wait)) => {
                    if let Some(outcome) = self.wait_out_rate_limit(wait, message, cancel).await {
                        return Ok(outcome);
                    }
                }
                Err(DeliveryError::Transient(reason)) => {
                    warn!(
                        channel = message.channel_id,
                        message_id = message.id,
                        "Error forwarding message, skipping: {}",
                        reason
                    );
                    return Ok(RelayOutcome::Dropped);
                }
                Err(e @ DeliveryError::Fatal(_)) => return Err(e.into()),
            }
        }
    }

    /// Ask the rate-limit policy about a flood wait and sit it out if allowed.
    ///
    /// Returns `None` once the request may be retried, or the terminal
    /// outcome (`Halted` or `Interrupted`) after state was flushed.
    pub async fn wait_out_rate_limit(
        &self,
        wait: Duration,
        message: &RelayMessage,
        cancel: &CancellationToken,
    ) -> Option<RelayOutcome> {
        warn!(
            channel = message.channel_id,
            message_id = message.id,
            "Flood wait: {} seconds",
            wait.as_secs()
        );
        let decision = tokio::select! {
            decision = self.policy.decide(wait, message) => decision,
            () = cancel.cancelled() => {
                flush_or_warn(self.store.as_ref(), "interrupted during flood wait").await;
                return Some(RelayOutcome::Interrupted);
            }
        };
        match decision {
            RateLimitDecision::Wait => {
                info!("⏳ Waiting {} seconds...", wait.as_secs());
                tokio::select! {
                    () = tokio::time::sleep(wait) => {
                        info!("Resuming forwarding...");
                        None
                    }
                    () = cancel.cancelled() => {
                        flush_or_warn(self.store.as_ref(), "interrupted during flood wait").await;
                        Some(RelayOutcome::Interrupted)
                    }
                }
            }
            RateLimitDecision::Stop => {
                flush_or_warn(self.store.as_ref(), "stopped on flood wait").await;
                info!(
                    channel = message.channel_id,
                    message_id = message.id,
                    "👋 Relay stopped. Please run again later."
                );
                Some(RelayOutcome::Halted)
            }
        }
    }

    /// Relay one message and advance its channel checkpoint if it was processed.
    ///
    /// # Errors
    ///
    /// Propagates fatal errors from [`Relay::relay`].
    pub async fn process(
        &self,
        message: &RelayMessage,
        cancel: &CancellationToken,
    ) -> Result<RelayOutcome, RelayError> {
        let outcome = self.relay(message, cancel).await?;
        if outcome.is_processed() {
            self.store
                .set_checkpoint(message.channel_id, message.id)
                .await;
        }
        Ok(outcome)
    }
}
