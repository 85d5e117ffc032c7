//! Testing helpers and in-memory backends.

use crate::backend::{Forwarder, HistorySource, Notifier};
use crate::error::{BackendError, DeliveryError};
use crate::message::{Media, MediaKind, RelayMessage};
use async_trait::async_trait;
use std::sync::Mutex;

/// Channel id used by all helpers.
pub const SOURCE: i64 = -100;

/// Audio message with a content id.
#[must_use]
pub fn audio(id: i32, unique_id: &str) -> RelayMessage {
    RelayMessage {
        id,
        channel_id: SOURCE,
        media: Some(Media {
            unique_id: Some(unique_id.to_string()),
            ..Media::bare(MediaKind::Audio)
        }),
    }
}

/// Voice recording.
#[must_use]
pub fn voice(id: i32) -> RelayMessage {
    RelayMessage {
        id,
        channel_id: SOURCE,
        media: Some(Media {
            unique_id: Some(format!("voice-{id}")),
            ..Media::bare(MediaKind::Voice)
        }),
    }
}

/// Text-only message.
#[must_use]
pub fn text(id: i32) -> RelayMessage {
    RelayMessage {
        id,
        channel_id: SOURCE,
        media: None,
    }
}

/// Forwarder that records every delivered message id.
#[derive(Default)]
pub struct RecordingForwarder {
    forwarded: Mutex<Vec<i32>>,
}

impl RecordingForwarder {
    /// Ids delivered so far, in order.
    pub fn forwarded_ids(&self) -> Vec<i32> {
        self.forwarded
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(&self, message: &RelayMessage) -> Result<(), DeliveryError> {
        if let Ok(mut ids) = self.forwarded.lock() {
            ids.push(message.id);
        }
        Ok(())
    }
}

/// History served from a fixed list.
pub struct VecHistory {
    messages: Vec<RelayMessage>,
    pages_served: Mutex<usize>,
}

impl VecHistory {
    /// History containing `messages` (any order).
    #[must_use]
    pub fn new(mut messages: Vec<RelayMessage>) -> Self {
        messages.sort_by_key(|m| m.id);
        Self {
            messages,
            pages_served: Mutex::new(0),
        }
    }

    /// Number of `fetch_after` calls.
    pub fn pages_served(&self) -> usize {
        self.pages_served.lock().map(|n| *n).unwrap_or_default()
    }
}

#[async_trait]
impl HistorySource for VecHistory {
    async fn fetch_after(
        &self,
        channel_id: i64,
        min_id: i32,
        limit: usize,
    ) -> Result<Vec<RelayMessage>, BackendError> {
        if let Ok(mut n) = self.pages_served.lock() {
            *n += 1;
        }
        Ok(self
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id && m.id > min_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Notifier that keeps every notice.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    /// Notices sent so far.
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<(), BackendError> {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(text.to_string());
        }
        Ok(())
    }
}
