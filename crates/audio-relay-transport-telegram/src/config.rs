//! Telegram transport settings.

use audio_relay_core::config::{build_config, RelaySettings};
use audio_relay_core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use teloxide::types::{ChatId, Recipient};

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    #[serde(default)]
    pub telegram_token: String,
    /// Source chat: numeric id or `@username`.
    pub source: Option<String>,
    /// Destination chat: numeric id or `@username`.
    pub dest: Option<String>,
    /// The only user allowed to send control commands.
    pub owner_id: Option<i64>,
    /// Private scratch chat used to read channel history.
    pub scratch_chat: Option<String>,
    /// Consecutive missing ids that mark the end of history.
    #[serde(default = "default_history_gap_limit")]
    pub history_gap_limit: u32,
    /// Messages requested per history page.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,
}

const fn default_history_gap_limit() -> u32 {
    HISTORY_GAP_LIMIT
}

const fn default_history_page_size() -> usize {
    audio_relay_core::backfill::DEFAULT_PAGE_SIZE
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Relay engine settings.
    pub relay: Arc<RelaySettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(relay: RelaySettings, telegram: TelegramSettings) -> Self {
        Self {
            relay: Arc::new(relay),
            telegram: Arc::new(telegram),
        }
    }
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required value is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every required value is present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` naming all missing keys.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.telegram_token.trim().is_empty() {
            missing.push("TELEGRAM_TOKEN");
        }
        if is_blank(self.source.as_deref()) {
            missing.push("SOURCE");
        }
        if is_blank(self.dest.as_deref()) {
            missing.push("DEST");
        }
        if self.owner_id.unwrap_or(0) == 0 {
            missing.push("OWNER_ID");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingRequired(missing.join(", ")))
        }
    }

    /// Source chat as a request target.
    #[must_use]
    pub fn source_recipient(&self) -> Recipient {
        parse_chat(self.source.as_deref().unwrap_or_default())
    }

    /// Destination chat as a request target.
    #[must_use]
    pub fn dest_recipient(&self) -> Recipient {
        parse_chat(self.dest.as_deref().unwrap_or_default())
    }

    /// Scratch chat, if history probing is configured.
    #[must_use]
    pub fn scratch_recipient(&self) -> Option<Recipient> {
        self.scratch_chat
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_chat)
    }

    /// Owner chat (their private chat with the bot).
    #[must_use]
    pub fn owner_chat(&self) -> ChatId {
        ChatId(self.owner_id.unwrap_or(0))
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|s| s.trim().is_empty())
}

/// Parse `-1001234`, `1234`, `@name` or `name` into a [`Recipient`].
#[must_use]
pub fn parse_chat(raw: &str) -> Recipient {
    let raw = raw.trim();
    match raw.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if raw.starts_with('@') => Recipient::ChannelUsername(raw.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{raw}")),
    }
}

/// Consecutive missing ids that end history probing.
pub const HISTORY_GAP_LIMIT: u32 = 50;
/// Capacity of the live message queue.
pub const LIVE_FEED_CAPACITY: usize = 1024;
/// Maximum retry attempts for Telegram API operations.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff for Telegram API retries.
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for Telegram API retries.
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
