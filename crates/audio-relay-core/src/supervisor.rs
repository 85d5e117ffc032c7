//! Whole-pipeline restart loop.
//!
//! A failed attempt is logged, state is flushed, and the pipeline is rebuilt
//! from scratch after a cooldown. Checkpoints and seen ids make a restart
//! safe to repeat.

use crate::config::{RelaySettings, RestartBackoffKind};
use crate::pipeline::PipelineExit;
use crate::storage::{flush_or_warn, RelayStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_retry::strategy::{ExponentialBackoff, FixedInterval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// An attempt that ran at least this long resets the restart backoff.
pub const HEALTHY_RUN: Duration = Duration::from_secs(600);

/// Restart delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartBackoff {
    /// Fixed or exponential.
    pub kind: RestartBackoffKind,
    /// First delay.
    pub base: Duration,
    /// Upper bound for exponential delays.
    pub max: Duration,
}

impl RestartBackoff {
    /// Same delay after every failure.
    #[must_use]
    pub const fn fixed(base: Duration) -> Self {
        Self {
            kind: RestartBackoffKind::Fixed,
            base,
            max: base,
        }
    }

    /// Schedule configured by `RESTART_*` settings.
    #[must_use]
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            kind: settings.restart_backoff,
            base: settings.restart_cooldown(),
            max: settings.restart_max_cooldown().max(settings.restart_cooldown()),
        }
    }

    /// Fresh iterator of delays.
    #[must_use]
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        match self.kind {
            RestartBackoffKind::Fixed => Box::new(FixedInterval::from_millis(base_ms)),
            // tokio-retry yields 2^n * factor: base, 2*base, 4*base, ...
            RestartBackoffKind::Exponential => Box::new(
                ExponentialBackoff::from_millis(2)
                    .factor((base_ms / 2).max(1))
                    .max_delay(self.max),
            ),
        }
    }
}

/// Runs pipeline attempts until one ends cleanly or an interrupt arrives.
pub struct Supervisor {
    backoff: RestartBackoff,
    store: Arc<dyn RelayStore>,
}

impl Supervisor {
    /// Supervisor flushing `store` after every failed attempt.
    #[must_use]
    pub fn new(backoff: RestartBackoff, store: Arc<dyn RelayStore>) -> Self {
        Self { backoff, store }
    }

    /// Call `attempt` (with a 1-based attempt number) until it returns `Ok`.
    pub async fn run<F, Fut>(&self, mut attempt: F, cancel: &CancellationToken) -> PipelineExit
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<PipelineExit>>,
    {
        let mut delays = self.backoff.delays();
        let mut number = 0u32;

        loop {
            if cancel.is_cancelled() {
                flush_or_warn(self.store.as_ref(), "shutdown").await;
                info!("Stopped by user");
                return PipelineExit::Interrupted;
            }

            number = number.saturating_add(1);
            let started = Instant::now();
            match attempt(number).await {
                Ok(exit) => {
                    flush_or_warn(self.store.as_ref(), "shutdown").await;
                    match exit {
                        PipelineExit::Interrupted => info!("Stopped by user"),
                        PipelineExit::OperatorStop => info!("Stopped on operator request"),
                    }
                    return exit;
                }
                Err(e) => {
                    flush_or_warn(self.store.as_ref(), "pipeline failure").await;
                    if started.elapsed() >= HEALTHY_RUN {
                        delays = self.backoff.delays();
                    }
                    let delay = delays.next().unwrap_or(self.backoff.max);
                    error!(
                        attempt = number,
                        "Fatal error: {:#}. Restarting in {}s...",
                        e,
                        delay.as_secs()
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonFileStore;
    use tempfile::tempdir;

    #[test]
    fn test_fixed_delays() {
        let delays: Vec<_> = RestartBackoff::fixed(Duration::from_secs(30))
            .delays()
            .take(3)
            .collect();
        assert_eq!(delays, vec![Duration::from_secs(30); 3]);
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let backoff = RestartBackoff {
            kind: RestartBackoffKind::Exponential,
            base: Duration::from_secs(30),
            max: Duration::from_secs(100),
        };
        let delays: Vec<_> = backoff.delays().take(4).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(100),
                Duration::from_secs(100),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_failures_with_cooldown() {
        let dir = tempdir().expect("tempdir");
        let store: Arc<dyn RelayStore> = Arc::new(JsonFileStore::open(dir.path()).await);
        let supervisor = Supervisor::new(RestartBackoff::fixed(Duration::from_secs(30)), store);

        let started = Instant::now();
        let exit = supervisor
            .run(
                |n| async move {
                    if n < 3 {
                        Err(anyhow::anyhow!("connection lost"))
                    } else {
                        Ok(PipelineExit::Interrupted)
                    }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(exit, PipelineExit::Interrupted);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_operator_stop_is_not_restarted() {
        let dir = tempdir().expect("tempdir");
        let store: Arc<dyn RelayStore> = Arc::new(JsonFileStore::open(dir.path()).await);
        let supervisor = Supervisor::new(RestartBackoff::fixed(Duration::from_secs(30)), store);
        let mut attempts = 0;

        let exit = supervisor
            .run(
                |_| {
                    attempts += 1;
                    async { Ok(PipelineExit::OperatorStop) }
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(exit, PipelineExit::OperatorStop);
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_interrupt_during_cooldown_exits() {
        let dir = tempdir().expect("tempdir");
        let store: Arc<dyn RelayStore> = Arc::new(JsonFileStore::open(dir.path()).await);
        let supervisor = Supervisor::new(RestartBackoff::fixed(Duration::from_secs(3600)), store);
        let cancel = CancellationToken::new();

        let exit = supervisor
            .run(
                |_| {
                    let cancel = cancel.clone();
                    async move {
                        cancel.cancel();
                        Err(anyhow::anyhow!("boom"))
                    }
                },
                &cancel,
            )
            .await;

        assert_eq!(exit, PipelineExit::Interrupted);
    }
}
