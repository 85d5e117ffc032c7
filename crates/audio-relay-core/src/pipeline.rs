//! One pipeline attempt: optional backfill, then live listening.

use crate::backend::{HistorySource, Notifier};
use crate::backfill::{run_backfill, BackfillEnd};
use crate::config::StartMode;
use crate::error::RelayError;
use crate::live::{run_live, LiveEnd};
use crate::message::RelayMessage;
use crate::relay::Relay;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Clean ways for a pipeline to end. Failures are `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// Operator interrupt (Ctrl+C).
    Interrupted,
    /// Operator declined a flood wait; state was saved.
    OperatorStop,
}

/// What a pipeline attempt should do for its source channel.
#[derive(Debug, Clone, Copy)]
pub struct SourcePlan {
    /// Source channel id.
    pub channel_id: i64,
    /// Run backfill before listening.
    pub backfill: bool,
    /// Start point for a never-checkpointed channel.
    pub start_mode: StartMode,
    /// History page size.
    pub page_size: usize,
}

/// Drive backfill (if planned) and then the live feed through `relay`.
///
/// Live messages that arrive during backfill wait in `feed`.
///
/// # Errors
///
/// Returns the first fatal `RelayError`; the supervisor restarts on it.
pub async fn run_pipeline(
    relay: &Relay,
    history: Option<&dyn HistorySource>,
    notifier: &dyn Notifier,
    feed: &mut mpsc::Receiver<RelayMessage>,
    plan: &SourcePlan,
    cancel: &CancellationToken,
) -> Result<PipelineExit, RelayError> {
    if plan.backfill {
        match history {
            Some(history) => {
                let end = run_backfill(
                    relay,
                    history,
                    notifier,
                    plan.channel_id,
                    plan.start_mode,
                    plan.page_size,
                    cancel,
                )
                .await?;
                match end {
                    BackfillEnd::Halted => return Ok(PipelineExit::OperatorStop),
                    BackfillEnd::Interrupted => return Ok(PipelineExit::Interrupted),
                    BackfillEnd::Skipped | BackfillEnd::Completed { .. } => {}
                }
            }
            None => warn!("BACKFILL is enabled but no history source is available, skipping"),
        }
    }

    match run_live(relay, feed, plan.channel_id, cancel).await? {
        LiveEnd::Halted => Ok(PipelineExit::OperatorStop),
        LiveEnd::Interrupted => Ok(PipelineExit::Interrupted),
    }
}
