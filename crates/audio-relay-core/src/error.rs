//! Error types for the relay engine.

use std::time::Duration;
use thiserror::Error;

/// Configuration errors detected before the pipeline starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required option is missing or empty.
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
    /// An option is present but cannot be used.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Option name.
        key: String,
        /// Why it was rejected.
        message: String,
    },
    /// Loading or deserializing the configuration sources failed.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors from persisting relay state.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error during JSON serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a failed delivery attempt.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Backend refuses further sends for the given duration.
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    /// The item could not be delivered; skip it.
    #[error("delivery failed: {0}")]
    Transient(String),
    /// The backend is unusable (lost connection, revoked token).
    #[error("fatal backend error: {0}")]
    Fatal(String),
}

/// Errors from backend queries (history, notifications, lookups).
#[derive(Error, Debug)]
pub enum BackendError {
    /// The request failed.
    #[error("backend request failed: {0}")]
    Request(String),
    /// The backend refused the query because of its configuration
    /// (unknown chat, missing rights); retrying will not help.
    #[error("unexpected backend response: {0}")]
    Unexpected(String),
    /// Backend refuses further queries for the given duration.
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
}

/// Failures that escape a relay step and restart the pipeline.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Delivery failed in a way that is not item-scoped.
    #[error("delivery: {0}")]
    Delivery(#[from] DeliveryError),
    /// Backend query failed.
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
    /// The live feed closed while the pipeline was running.
    #[error("live feed closed")]
    FeedClosed,
}
