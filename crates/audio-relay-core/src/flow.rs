//! Pause/resume state and the forwarded counter.
//!
//! Both fields live in one `watch` channel, so a status read always sees a
//! consistent pair and backfill can park until the relay is resumed.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Snapshot of the flow state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowState {
    /// Relaying is suspended.
    pub paused: bool,
    /// Items delivered during this process lifetime.
    pub forwarded_count: u64,
}

/// Shared accessor for [`FlowState`].
#[derive(Debug)]
pub struct FlowController {
    state: watch::Sender<FlowState>,
}

impl Default for FlowController {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowController {
    /// Running, nothing forwarded.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(FlowState::default());
        Self { state }
    }

    /// Suspend relaying.
    pub fn pause(&self) {
        self.state.send_modify(|s| s.paused = true);
    }

    /// Resume relaying.
    pub fn resume(&self) {
        self.state.send_modify(|s| s.paused = false);
    }

    /// Whether relaying is suspended.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    /// Count one delivered item and return the new total.
    pub fn increment_forwarded(&self) -> u64 {
        let mut total = 0;
        self.state.send_modify(|s| {
            s.forwarded_count += 1;
            total = s.forwarded_count;
        });
        total
    }

    /// Consistent copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> FlowState {
        *self.state.borrow()
    }

    /// Wait until not paused.
    ///
    /// Returns `false` if `cancel` fired first.
    pub async fn wait_until_resumed(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.state.subscribe();
        tokio::select! {
            resumed = async { rx.wait_for(|s| !s.paused).await.is_ok() } => resumed,
            () = cancel.cancelled() => false,
        }
    }
}
