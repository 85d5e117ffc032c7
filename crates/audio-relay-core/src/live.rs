//! Live listener: relays new messages in arrival order.

use crate::error::RelayError;
use crate::message::RelayMessage;
use crate::relay::{Relay, RelayOutcome};
use crate::storage::flush_or_warn;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How the live listener stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEnd {
    /// Interrupt observed.
    Interrupted,
    /// Operator stopped on a flood wait.
    Halted,
}

/// Consume `feed` until interrupted, relaying messages from `channel_id`.
///
/// This is the only consumer of the feed, so relays never overlap. Messages
/// at or below the channel checkpoint were already handled by backfill and
/// are skipped; messages arriving while paused are dropped.
///
/// # Errors
///
/// Returns `RelayError::FeedClosed` if the transport drops the feed, or any
/// fatal relay error.
pub async fn run_live(
    relay: &Relay,
    feed: &mut mpsc::Receiver<RelayMessage>,
    channel_id: i64,
    cancel: &CancellationToken,
) -> Result<LiveEnd, RelayError> {
    info!("Listening for new messages... Press Ctrl+C to stop");

    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                flush_or_warn(relay.store().as_ref(), "shutdown").await;
                return Ok(LiveEnd::Interrupted);
            }
            next = feed.recv() => match next {
                Some(message) => message,
                None => return Err(RelayError::FeedClosed),
            },
        };

        if message.channel_id != channel_id {
            debug!(channel = message.channel_id, "Ignoring message from another chat");
            continue;
        }
        let checkpoint = relay.store().checkpoint(channel_id).await;
        if message.id <= checkpoint {
            debug!(
                channel = channel_id,
                message_id = message.id,
                checkpoint,
                "Already processed"
            );
            continue;
        }

        match relay.process(&message, cancel).await? {
            RelayOutcome::Paused => {
                debug!(channel = channel_id, message_id = message.id, "Paused, dropping");
            }
            RelayOutcome::Halted => return Ok(LiveEnd::Halted),
            RelayOutcome::Interrupted => return Ok(LiveEnd::Interrupted),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowController;
    use crate::rate_limit::AlwaysStop;
    use crate::storage::{JsonFileStore, RelayStore};
    use crate::testing::{audio, RecordingForwarder, SOURCE};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn relay(dir: &std::path::Path, forwarder: Arc<RecordingForwarder>) -> Arc<Relay> {
        let store: Arc<dyn RelayStore> = Arc::new(JsonFileStore::open(dir).await);
        Arc::new(Relay::new(
            forwarder,
            store,
            Arc::new(FlowController::new()),
            Arc::new(AlwaysStop),
            10,
        ))
    }

    fn spawn_live(
        relay: Arc<Relay>,
        mut feed: mpsc::Receiver<RelayMessage>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<LiveEnd, RelayError>> {
        tokio::spawn(async move { run_live(&relay, &mut feed, SOURCE, &cancel).await })
    }

    #[tokio::test]
    async fn test_relays_in_arrival_order_and_checkpoints() {
        let dir = tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let relay = relay(dir.path(), forwarder.clone()).await;
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = spawn_live(relay.clone(), rx, cancel.clone());

        for (id, uid) in [(10, "a"), (11, "b"), (12, "a")] {
            tx.send(audio(id, uid)).await.expect("send");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        assert_eq!(task.await.expect("join").expect("live"), LiveEnd::Interrupted);
        assert_eq!(forwarder.forwarded_ids(), vec![10, 11]);
        assert_eq!(relay.store().checkpoint(SOURCE).await, 12);
        // Interrupt flushes.
        assert_eq!(relay.store().persisted_checkpoint(SOURCE).await, 12);
    }

    #[tokio::test]
    async fn test_paused_messages_are_dropped_not_queued() {
        let dir = tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let relay = relay(dir.path(), forwarder.clone()).await;
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = spawn_live(relay.clone(), rx, cancel.clone());

        relay.flow().pause();
        tx.send(audio(1, "a")).await.expect("send");
        tokio::time::sleep(Duration::from_millis(30)).await;
        relay.flow().resume();
        tx.send(audio(2, "b")).await.expect("send");
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        task.await.expect("join").expect("live");

        assert_eq!(forwarder.forwarded_ids(), vec![2]);
        assert!(!relay.store().is_seen("a").await);
    }

    #[tokio::test]
    async fn test_skips_ids_at_or_below_checkpoint() {
        let dir = tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let relay = relay(dir.path(), forwarder.clone()).await;
        relay.store().set_checkpoint(SOURCE, 20).await;
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let task = spawn_live(relay.clone(), rx, cancel.clone());

        tx.send(audio(19, "old")).await.expect("send");
        tx.send(audio(20, "same")).await.expect("send");
        tx.send(audio(21, "new")).await.expect("send");
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        task.await.expect("join").expect("live");

        assert_eq!(forwarder.forwarded_ids(), vec![21]);
    }

    #[tokio::test]
    async fn test_closed_feed_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let relay = relay(dir.path(), Arc::new(RecordingForwarder::default())).await;
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        let result = spawn_live(relay, rx, CancellationToken::new())
            .await
            .expect("join");
        assert!(matches!(result, Err(RelayError::FeedClosed)));
    }
}
