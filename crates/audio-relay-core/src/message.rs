//! Transport-neutral view of a source message.
//!
//! Transports convert their native message type into [`RelayMessage`] so the
//! relay engine never depends on a concrete messaging client.

use serde::{Deserialize, Serialize};

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    /// Tagged audio track.
    Audio,
    /// Voice recording.
    Voice,
    /// Generic document (file).
    Document,
    /// Any other media (photo, video, sticker, ...).
    Other,
}

/// Media payload of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    /// Media kind.
    pub kind: MediaKind,
    /// Declared MIME type, if any.
    pub mime_type: Option<String>,
    /// Original file name, if any.
    pub file_name: Option<String>,
    /// Content id stable across retrievals of the same file.
    pub unique_id: Option<String>,
}

impl Media {
    /// Media without any metadata.
    #[must_use]
    pub const fn bare(kind: MediaKind) -> Self {
        Self {
            kind,
            mime_type: None,
            file_name: None,
            unique_id: None,
        }
    }
}

/// Immutable message as seen by the relay engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// Message id, increasing within the source channel.
    pub id: i32,
    /// Channel the message came from.
    pub channel_id: i64,
    /// Attached media.
    pub media: Option<Media>,
}

impl RelayMessage {
    /// Content-unique id of the attached media, if it is document-backed.
    #[must_use]
    pub fn unique_id(&self) -> Option<&str> {
        self.media.as_ref().and_then(|m| m.unique_id.as_deref())
    }
}
