//! Decides whether a message carries relayable audio.

use crate::message::{MediaKind, RelayMessage};

/// File extensions accepted when the MIME type does not say `audio/*`.
pub const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".m4a", ".flac", ".ogg", ".wav", ".aac", ".amr"];

/// Returns `true` if the message is music/audio that should be relayed.
///
/// Voice recordings are always rejected, tagged audio is always accepted.
/// Documents qualify by an `audio/` MIME type or a known audio extension.
///
/// # Examples
///
/// ```
/// use audio_relay_core::classifier::is_relayable;
/// use audio_relay_core::message::{Media, MediaKind, RelayMessage};
///
/// let msg = RelayMessage {
///     id: 1,
///     channel_id: -100,
///     media: Some(Media {
///         file_name: Some("Track.FLAC".to_string()),
///         ..Media::bare(MediaKind::Document)
///     }),
/// };
/// assert!(is_relayable(&msg));
/// ```
#[must_use]
pub fn is_relayable(message: &RelayMessage) -> bool {
    let Some(media) = message.media.as_ref() else {
        return false;
    };

    match media.kind {
        MediaKind::Voice | MediaKind::Other => false,
        MediaKind::Audio => true,
        MediaKind::Document => {
            if media
                .mime_type
                .as_deref()
                .is_some_and(|mime| mime.to_ascii_lowercase().starts_with("audio/"))
            {
                return true;
            }
            media.file_name.as_deref().is_some_and(has_audio_extension)
        }
    }
}

fn has_audio_extension(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}
