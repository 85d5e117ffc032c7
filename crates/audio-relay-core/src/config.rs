//! Configuration and settings management
//!
//! Loads relay settings from config files and environment variables.

use crate::error::ConfigError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of forwarded items between flushes.
pub const DEFAULT_BATCH_SIZE: u64 = 10;
/// Default cooldown before the supervisor restarts the pipeline.
pub const DEFAULT_RESTART_COOLDOWN_SECS: u64 = 30;
/// Default cap for exponential restart backoff.
pub const DEFAULT_RESTART_MAX_COOLDOWN_SECS: u64 = 600;

/// Where backfill starts on a channel that has never been checkpointed.
///
/// Parsed case-insensitively, so `START_MODE=Oldest` works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    /// Replay all history not yet checkpointed.
    Oldest,
    /// Skip history on first run and only watch new messages.
    #[default]
    Latest,
}

impl StartMode {
    /// Name as written in `START_MODE`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oldest => "oldest",
            Self::Latest => "latest",
        }
    }
}

impl<'de> Deserialize<'de> for StartMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "oldest" => Ok(Self::Oldest),
            "latest" => Ok(Self::Latest),
            _ => Err(serde::de::Error::unknown_variant(
                &raw,
                &["oldest", "latest"],
            )),
        }
    }
}

/// How the supervisor spaces out pipeline restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartBackoffKind {
    /// Always wait the base cooldown.
    #[default]
    Fixed,
    /// Double the wait after every failure, up to the cap.
    Exponential,
}

/// What to do when the backend imposes a flood wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitPolicyKind {
    /// Ask the operator on the terminal.
    #[default]
    Prompt,
    /// Wait unattended (bounded by `max_rate_limit_wait_secs`).
    Wait,
    /// Persist state and stop.
    Stop,
}

/// Relay engine settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelaySettings {
    /// Replay history before listening.
    #[serde(default)]
    pub backfill: bool,
    /// Start point for channels without a checkpoint.
    #[serde(default)]
    pub start_mode: StartMode,
    /// Forwarded items between flushes.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Directory holding `progress.json` and `seen.json`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Base restart cooldown in seconds.
    #[serde(default = "default_restart_cooldown_secs")]
    pub restart_cooldown_secs: u64,
    /// Restart delay strategy.
    #[serde(default)]
    pub restart_backoff: RestartBackoffKind,
    /// Upper bound for exponential restart delay in seconds.
    #[serde(default = "default_restart_max_cooldown_secs")]
    pub restart_max_cooldown_secs: u64,
    /// Flood wait handling.
    #[serde(default)]
    pub rate_limit_policy: RateLimitPolicyKind,
    /// Longest flood wait accepted by the `wait` policy.
    pub max_rate_limit_wait_secs: Option<u64>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            backfill: false,
            start_mode: StartMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            state_dir: default_state_dir(),
            restart_cooldown_secs: DEFAULT_RESTART_COOLDOWN_SECS,
            restart_backoff: RestartBackoffKind::default(),
            restart_max_cooldown_secs: DEFAULT_RESTART_MAX_COOLDOWN_SECS,
            rate_limit_policy: RateLimitPolicyKind::default(),
            max_rate_limit_wait_secs: None,
        }
    }
}

const fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

const fn default_restart_cooldown_secs() -> u64 {
    DEFAULT_RESTART_COOLDOWN_SECS
}

const fn default_restart_max_cooldown_secs() -> u64 {
    DEFAULT_RESTART_MAX_COOLDOWN_SECS
}

/// Build the layered configuration shared by all settings structs.
///
/// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP_*` variables, then plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a source cannot be read.
pub fn build_config() -> Result<Config, config::ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE onto snake_case keys;
        // empty variables count as unset.
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl RelaySettings {
    /// Load relay settings from the environment and config files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a value is out of range.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero batch size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BATCH_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Base restart cooldown.
    #[must_use]
    pub const fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }

    /// Cap for the exponential restart cooldown.
    #[must_use]
    pub const fn restart_max_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_max_cooldown_secs)
    }

    /// Longest acceptable unattended flood wait.
    #[must_use]
    pub fn max_rate_limit_wait(&self) -> Option<Duration> {
        self.max_rate_limit_wait_secs.map(Duration::from_secs)
    }
}
