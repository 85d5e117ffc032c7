//! Conversion from Telegram messages to [`RelayMessage`].

use audio_relay_core::message::{Media, MediaKind, RelayMessage};
use teloxide::types::{ChatId, Message, MessageId};

/// Convert a Telegram message.
///
/// `id` and `channel_id` identify the original message; they differ from
/// `msg.id`/`msg.chat.id` when `msg` is a forwarded copy in the scratch chat.
#[must_use]
pub fn relay_message_from(msg: &Message, id: MessageId, channel_id: ChatId) -> RelayMessage {
    RelayMessage {
        id: id.0,
        channel_id: channel_id.0,
        media: media_of(msg),
    }
}

fn media_of(msg: &Message) -> Option<Media> {
    if let Some(voice) = msg.voice() {
        return Some(Media {
            kind: MediaKind::Voice,
            mime_type: voice.mime_type.as_ref().map(ToString::to_string),
            file_name: None,
            unique_id: Some(voice.file.unique_id.to_string()),
        });
    }
    if let Some(audio) = msg.audio() {
        return Some(Media {
            kind: MediaKind::Audio,
            mime_type: audio.mime_type.as_ref().map(ToString::to_string),
            file_name: audio.file_name.clone(),
            unique_id: Some(audio.file.unique_id.to_string()),
        });
    }
    if let Some(document) = msg.document() {
        return Some(Media {
            kind: MediaKind::Document,
            mime_type: document.mime_type.as_ref().map(ToString::to_string),
            file_name: document.file_name.clone(),
            unique_id: Some(document.file.unique_id.to_string()),
        });
    }
    let has_other_media = msg.photo().is_some()
        || msg.video().is_some()
        || msg.animation().is_some()
        || msg.video_note().is_some()
        || msg.sticker().is_some();
    has_other_media.then(|| Media::bare(MediaKind::Other))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL: i64 = -1_002_236_736_395;

    fn channel_post(id: i32, body: &str) -> Message {
        let json = format!(
            r#"{{
                "message_id": {id},
                "sender_chat": {{ "id": {CHANNEL}, "title": "Music", "type": "channel" }},
                "chat": {{ "id": {CHANNEL}, "title": "Music", "type": "channel" }},
                "date": 1721162577,
                {body}
            }}"#
        );
        serde_json::from_str(&json).expect("message json")
    }

    fn convert(msg: &Message) -> RelayMessage {
        relay_message_from(msg, msg.id, msg.chat.id)
    }

    #[test]
    fn test_audio_keeps_metadata() {
        let msg = channel_post(
            10,
            r#""audio": {
                "file_id": "CQACAgIAAxkBAAIBOmQ",
                "file_unique_id": "AgADOgEAAnVx",
                "file_size": 4096,
                "duration": 215,
                "title": "Track",
                "file_name": "track.mp3",
                "mime_type": "audio/mpeg"
            }"#,
        );
        let converted = convert(&msg);
        assert_eq!(converted.id, 10);
        assert_eq!(converted.channel_id, CHANNEL);
        let media = converted.media.expect("media");
        assert_eq!(media.kind, MediaKind::Audio);
        assert_eq!(media.mime_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(media.file_name.as_deref(), Some("track.mp3"));
        assert_eq!(media.unique_id.as_deref(), Some("AgADOgEAAnVx"));
    }

    #[test]
    fn test_voice_is_voice() {
        let msg = channel_post(
            11,
            r#""voice": {
                "file_id": "AwACAgIAAxkBAAIBO2Q",
                "file_unique_id": "AgADOwEAAnVx",
                "file_size": 2048,
                "duration": 4,
                "mime_type": "audio/ogg"
            }"#,
        );
        let media = convert(&msg).media.expect("media");
        assert_eq!(media.kind, MediaKind::Voice);
        assert_eq!(media.unique_id.as_deref(), Some("AgADOwEAAnVx"));
    }

    #[test]
    fn test_document_keeps_file_name() {
        let msg = channel_post(
            12,
            r#""document": {
                "file_id": "BQACAgIAAxkBAAIBPGQ",
                "file_unique_id": "AgADPAEAAnVx",
                "file_size": 8192,
                "file_name": "set.flac",
                "mime_type": "audio/flac"
            }"#,
        );
        let media = convert(&msg).media.expect("media");
        assert_eq!(media.kind, MediaKind::Document);
        assert_eq!(media.file_name.as_deref(), Some("set.flac"));
        assert_eq!(media.mime_type.as_deref(), Some("audio/flac"));
    }

    #[test]
    fn test_photo_is_other_media() {
        let msg = channel_post(
            13,
            r#""photo": [{
                "file_id": "AgACAgIAAxkBAAIBPWQ",
                "file_unique_id": "AQADPQEAAnVx",
                "file_size": 18188,
                "width": 320,
                "height": 239
            }]"#,
        );
        assert_eq!(convert(&msg).media, Some(Media::bare(MediaKind::Other)));
    }

    #[test]
    fn test_text_has_no_media() {
        let msg = channel_post(14, r#""text": "new release friday""#);
        assert_eq!(convert(&msg).media, None);
    }

    #[test]
    fn test_forwarded_copy_keeps_original_ids() {
        let msg = channel_post(15, r#""text": "copy""#);
        let converted = relay_message_from(&msg, MessageId(3), ChatId(-100));
        assert_eq!(converted.id, 3);
        assert_eq!(converted.channel_id, -100);
    }
}
