//! Owner-only control commands.

use crate::flow::FlowController;
use crate::storage::{flush_or_warn, RelayStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Control command sent by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Stop relaying and save state.
    Pause,
    /// Continue relaying.
    Resume,
    /// Report flow state and checkpoint.
    Status,
}

/// Applies control commands from the single authorized identity.
pub struct CommandSurface {
    owner_id: i64,
    channel_id: i64,
    flow: Arc<FlowController>,
    store: Arc<dyn RelayStore>,
}

impl CommandSurface {
    /// Commands from `owner_id` control the relay of `channel_id`.
    #[must_use]
    pub fn new(
        owner_id: i64,
        channel_id: i64,
        flow: Arc<FlowController>,
        store: Arc<dyn RelayStore>,
    ) -> Self {
        Self {
            owner_id,
            channel_id,
            flow,
            store,
        }
    }

    /// Whether `sender_id` may control the relay.
    #[must_use]
    pub const fn is_owner(&self, sender_id: i64) -> bool {
        sender_id == self.owner_id
    }

    /// Apply a command and return the reply text.
    ///
    /// Returns `None` for anyone but the owner; they get no reply at all.
    pub async fn handle(&self, sender_id: i64, command: ControlCommand) -> Option<String> {
        if !self.is_owner(sender_id) {
            debug!(sender_id, ?command, "Ignoring command from non-owner");
            return None;
        }

        let reply = match command {
            ControlCommand::Pause => {
                self.flow.pause();
                flush_or_warn(self.store.as_ref(), "pause").await;
                info!("⏸️ Relay paused by owner");
                "⏸️ Relay paused".to_string()
            }
            ControlCommand::Resume => {
                self.flow.resume();
                info!("▶️ Relay resumed by owner");
                "▶️ Relay resumed".to_string()
            }
            ControlCommand::Status => {
                let state = self.flow.snapshot();
                let last_id = self.store.checkpoint(self.channel_id).await;
                let saved_id = self.store.persisted_checkpoint(self.channel_id).await;
                format!(
                    "📊 Status:\nPaused: {}\nForwarded: {}\nLast ID: {} (saved: {})",
                    state.paused, state.forwarded_count, last_id, saved_id
                )
            }
        };
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonFileStore;
    use crate::testing::SOURCE;
    use tempfile::tempdir;

    const OWNER: i64 = 42;

    async fn surface(dir: &std::path::Path) -> CommandSurface {
        let store: Arc<dyn RelayStore> = Arc::new(JsonFileStore::open(dir).await);
        CommandSurface::new(OWNER, SOURCE, Arc::new(FlowController::new()), store)
    }

    #[tokio::test]
    async fn test_non_owner_is_ignored() {
        let dir = tempdir().expect("tempdir");
        let surface = surface(dir.path()).await;

        assert_eq!(surface.handle(7, ControlCommand::Pause).await, None);
        assert_eq!(surface.handle(7, ControlCommand::Status).await, None);
        assert!(!surface.flow.is_paused());
    }

    #[tokio::test]
    async fn test_pause_flushes_and_resume_clears() {
        let dir = tempdir().expect("tempdir");
        let surface = surface(dir.path()).await;
        surface.store.set_checkpoint(SOURCE, 9).await;

        let reply = surface.handle(OWNER, ControlCommand::Pause).await;
        assert_eq!(reply.as_deref(), Some("⏸️ Relay paused"));
        assert!(surface.flow.is_paused());
        assert_eq!(surface.store.persisted_checkpoint(SOURCE).await, 9);

        let reply = surface.handle(OWNER, ControlCommand::Resume).await;
        assert_eq!(reply.as_deref(), Some("▶️ Relay resumed"));
        assert!(!surface.flow.is_paused());
    }

    #[tokio::test]
    async fn test_status_is_read_only() {
        let dir = tempdir().expect("tempdir");
        let surface = surface(dir.path()).await;
        surface.flow.increment_forwarded();
        surface.store.set_checkpoint(SOURCE, 5).await;

        let reply = surface
            .handle(OWNER, ControlCommand::Status)
            .await
            .unwrap_or_default();
        assert_eq!(
            reply,
            "📊 Status:\nPaused: false\nForwarded: 1\nLast ID: 5 (saved: 0)"
        );
        assert_eq!(surface.store.persisted_checkpoint(SOURCE).await, 0);
        assert!(!surface.flow.is_paused());
    }
}
