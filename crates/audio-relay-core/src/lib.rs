#![deny(missing_docs)]
//! Audio Relay core library.
//!
//! Transport-agnostic relay engine: classification, deduplication,
//! checkpointed backfill, pause/resume control and rate-limit backoff.

/// Backfill planning and the lazy history stream.
pub mod backfill;
/// Collaborator traits implemented by messaging transports.
pub mod backend;
/// Audio classifier.
pub mod classifier;
/// Owner-only control commands.
pub mod commands;
/// Configuration management.
pub mod config;
/// Error types.
pub mod error;
/// Pause/resume state and forwarded counter.
pub mod flow;
/// Live message consumer.
pub mod live;
/// Relay message model.
pub mod message;
/// Backfill + live pipeline for one source channel.
pub mod pipeline;
/// Operator decision point for rate-limit waits.
pub mod rate_limit;
/// Single-message relay operation.
pub mod relay;
/// Durable checkpoint and seen-id stores.
pub mod storage;
/// Whole-pipeline restart loop.
pub mod supervisor;

/// In-memory backends for tests.
#[cfg(test)]
pub mod testing;
