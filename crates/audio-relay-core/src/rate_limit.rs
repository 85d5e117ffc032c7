//! Operator decision point for flood waits.

use crate::config::{RateLimitPolicyKind, RelaySettings};
use crate::message::RelayMessage;
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What to do about a mandatory backend wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Sleep for the wait, then retry the same item.
    Wait,
    /// Persist state and stop the relay.
    Stop,
}

/// Decides between waiting out a flood wait and stopping.
#[async_trait]
pub trait RateLimitPolicy: Send + Sync {
    /// Called once per rate-limit signal. May block on operator input.
    async fn decide(&self, wait: Duration, message: &RelayMessage) -> RateLimitDecision;
}

/// Asks on the terminal, like `Do you want to wait 60 seconds? (Y/N)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

#[async_trait]
impl RateLimitPolicy for ConsolePrompt {
    async fn decide(&self, wait: Duration, message: &RelayMessage) -> RateLimitDecision {
        let question = format!(
            "Flood wait of {} seconds at message {}. Wait and continue? (Y/N): ",
            wait.as_secs(),
            message.id
        );

        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stdout = io::stdout().lock();
            stdout.write_all(question.as_bytes())?;
            stdout.flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => parse_answer(&line),
            Ok(Err(e)) => {
                warn!("Could not read operator answer, stopping: {}", e);
                RateLimitDecision::Stop
            }
            Err(e) => {
                warn!("Operator prompt task failed, stopping: {}", e);
                RateLimitDecision::Stop
            }
        }
    }
}

fn parse_answer(line: &str) -> RateLimitDecision {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => RateLimitDecision::Wait,
        _ => RateLimitDecision::Stop,
    }
}

/// Waits unattended, refusing waits longer than `max_wait`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysWait {
    /// Longest acceptable wait; `None` accepts any.
    pub max_wait: Option<Duration>,
}

#[async_trait]
impl RateLimitPolicy for AlwaysWait {
    async fn decide(&self, wait: Duration, message: &RelayMessage) -> RateLimitDecision {
        match self.max_wait {
            Some(max) if wait > max => {
                warn!(
                    message_id = message.id,
                    "Flood wait of {}s exceeds limit of {}s, stopping",
                    wait.as_secs(),
                    max.as_secs()
                );
                RateLimitDecision::Stop
            }
            _ => RateLimitDecision::Wait,
        }
    }
}

/// Never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysStop;

#[async_trait]
impl RateLimitPolicy for AlwaysStop {
    async fn decide(&self, wait: Duration, message: &RelayMessage) -> RateLimitDecision {
        info!(
            message_id = message.id,
            "Flood wait of {}s, stopping as configured",
            wait.as_secs()
        );
        RateLimitDecision::Stop
    }
}

/// Build the policy selected by `RATE_LIMIT_POLICY`.
#[must_use]
pub fn policy_from_settings(settings: &RelaySettings) -> Arc<dyn RateLimitPolicy> {
    match settings.rate_limit_policy {
        RateLimitPolicyKind::Prompt => Arc::new(ConsolePrompt),
        RateLimitPolicyKind::Wait => Arc::new(AlwaysWait {
            max_wait: settings.max_rate_limit_wait(),
        }),
        RateLimitPolicyKind::Stop => Arc::new(AlwaysStop),
    }
}
