//! The wire envelope protocol.
//!
//! One JSON object per frame:
//!
//! ```text
//! { "type": "<text|image|video|audio|file|notice>",
//!   "sender": { "id", "name", "nickname", "type" } | omitted on inbound,
//!   "timestamp": <int64 ms>,
//!   "content": { ...variant-specific fields... } }
//! ```
//!
//! Decoding is two-phase: [`peek_kind`] extracts only the type tag, then
//! [`decode`] parses the full variant payload for the discovered tag.
//! The payload shape is type-dependent, so a single-phase decode cannot
//! know which shape to expect. The room exploits the split: a muted
//! sender is answered after phase one without ever paying for phase two.

use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;
use crate::participant::Participant;

/// Message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    File,
    Notice,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Audio => "audio",
            MessageKind::File => "file",
            MessageKind::Notice => "notice",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "video" => Some(MessageKind::Video),
            "audio" => Some(MessageKind::Audio),
            "file" => Some(MessageKind::File),
            "notice" => Some(MessageKind::Notice),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub url: String,
    pub thumbnail_url: String,
    pub width: u32,
    pub height: u32,
    pub image_size: i64,
    pub format: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoContent {
    pub url: String,
    pub thumbnail_url: String,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub video_size: i64,
    pub format: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioContent {
    pub url: String,
    pub duration: f64,
    pub audio_size: i64,
    pub format: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    pub url: String,
    pub file_size: i64,
    pub format: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeContent {
    pub event: String,
    pub message: String,
}

/// Tagged payload variants. Serializes as the `type` + `content` pair of
/// the wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum Content {
    Text(TextContent),
    Image(ImageContent),
    Video(VideoContent),
    Audio(AudioContent),
    File(FileContent),
    Notice(NoticeContent),
}

impl Content {
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Content::Text(_) => MessageKind::Text,
            Content::Image(_) => MessageKind::Image,
            Content::Video(_) => MessageKind::Video,
            Content::Audio(_) => MessageKind::Audio,
            Content::File(_) => MessageKind::File,
            Content::Notice(_) => MessageKind::Notice,
        }
    }
}

/// A complete message envelope. Immutable once broadcast.
///
/// The sender is absent on the wire for client-originated messages and
/// is stamped by the room before fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Participant>,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

impl Envelope {
    /// A room-originated notice stamped with the current time.
    pub fn notice(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            content: Content::Notice(NoticeContent {
                event: event.into(),
                message: message.into(),
            }),
            sender: None,
            timestamp_ms: now_ms(),
        }
    }

    #[must_use]
    pub fn with_sender(mut self, sender: Participant) -> Self {
        self.sender = Some(sender);
        self
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.content.kind()
    }

    #[must_use]
    pub fn sender_id(&self) -> Option<&str> {
        self.sender.as_ref().map(Participant::id)
    }

    /// Serialize to a wire frame.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Current wall-clock time in milliseconds since the epoch.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Deserialize)]
struct Header {
    #[serde(rename = "type")]
    tag: String,
}

#[derive(Deserialize)]
struct RawFrame<T> {
    content: T,
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Phase one: extract only the type tag.
pub fn peek_kind(raw: &[u8]) -> Result<MessageKind, DecodeError> {
    let header: Header =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Header(e.to_string()))?;
    MessageKind::from_tag(&header.tag).ok_or(DecodeError::UnknownKind(header.tag))
}

fn decode_frame<T: DeserializeOwned>(
    kind: MessageKind,
    raw: &[u8],
) -> Result<(T, Option<i64>), DecodeError> {
    let frame: RawFrame<T> = serde_json::from_slice(raw).map_err(|e| DecodeError::Payload {
        kind,
        detail: e.to_string(),
    })?;
    Ok((frame.content, frame.timestamp))
}

/// Phase two: decode the full variant payload for a known tag.
///
/// The returned envelope has no sender; the room stamps it before
/// fan-out. A client-supplied timestamp is preserved; a missing one is
/// stamped with the current time.
pub fn decode(kind: MessageKind, raw: &[u8]) -> Result<Envelope, DecodeError> {
    let (content, timestamp) = match kind {
        MessageKind::Text => {
            let (c, t) = decode_frame::<TextContent>(kind, raw)?;
            (Content::Text(c), t)
        }
        MessageKind::Image => {
            let (c, t) = decode_frame::<ImageContent>(kind, raw)?;
            (Content::Image(c), t)
        }
        MessageKind::Video => {
            let (c, t) = decode_frame::<VideoContent>(kind, raw)?;
            (Content::Video(c), t)
        }
        MessageKind::Audio => {
            let (c, t) = decode_frame::<AudioContent>(kind, raw)?;
            (Content::Audio(c), t)
        }
        MessageKind::File => {
            let (c, t) = decode_frame::<FileContent>(kind, raw)?;
            (Content::File(c), t)
        }
        MessageKind::Notice => {
            let (c, t) = decode_frame::<NoticeContent>(kind, raw)?;
            (Content::Notice(c), t)
        }
    };

    Ok(Envelope {
        content,
        sender: None,
        timestamp_ms: timestamp.unwrap_or_else(now_ms),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::identity::{AccountKind, User};

    #[test]
    fn test_peek_kind_reads_only_the_tag() {
        let raw = br#"{"type":"text","content":{"text":"hi"},"timestamp":1000}"#;
        assert_eq!(peek_kind(raw).unwrap(), MessageKind::Text);

        // Phase one succeeds even when the payload is garbage for the tag.
        let raw = br#"{"type":"image","content":{"text":"hi"}}"#;
        assert_eq!(peek_kind(raw).unwrap(), MessageKind::Image);
    }

    #[test]
    fn test_peek_kind_rejects_unknown_tag() {
        let raw = br#"{"type":"sticker","content":{}}"#;
        assert!(matches!(
            peek_kind(raw),
            Err(DecodeError::UnknownKind(tag)) if tag == "sticker"
        ));
    }

    #[test]
    fn test_peek_kind_rejects_malformed_header() {
        assert!(matches!(
            peek_kind(b"not json"),
            Err(DecodeError::Header(_))
        ));
        assert!(matches!(
            peek_kind(br#"{"content":{}}"#),
            Err(DecodeError::Header(_))
        ));
    }

    #[test]
    fn test_decode_text_preserves_client_timestamp() {
        let raw = br#"{"type":"text","content":{"text":"hello"},"timestamp":42}"#;
        let env = decode(MessageKind::Text, raw).unwrap();
        assert_eq!(env.timestamp_ms, 42);
        assert!(env.sender.is_none());
        assert_eq!(
            env.content,
            Content::Text(TextContent {
                text: "hello".to_string()
            })
        );
    }

    #[test]
    fn test_decode_stamps_missing_timestamp() {
        let before = now_ms();
        let raw = br#"{"type":"text","content":{"text":"hello"}}"#;
        let env = decode(MessageKind::Text, raw).unwrap();
        assert!(env.timestamp_ms >= before);
    }

    #[test]
    fn test_decode_rejects_wrong_payload_shape() {
        let raw = br#"{"type":"image","content":{"text":"hi"}}"#;
        let kind = peek_kind(raw).unwrap();
        assert!(matches!(
            decode(kind, raw),
            Err(DecodeError::Payload {
                kind: MessageKind::Image,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_image_payload() {
        let raw = br#"{"type":"image","content":{
            "url":"https://cdn/x.png","thumbnail_url":"https://cdn/x-t.png",
            "width":640,"height":480,"image_size":20480,
            "format":"png","file_name":"x.png"},"timestamp":7}"#;
        let env = decode(MessageKind::Image, raw).unwrap();
        match env.content {
            Content::Image(img) => {
                assert_eq!(img.width, 640);
                assert_eq!(img.file_name, "x.png");
            }
            other => panic!("expected image content, got {other:?}"),
        }
    }

    #[test]
    fn test_serialize_omits_absent_sender() {
        let env = Envelope::notice("user_join", "'alice' has joined the room.");
        let json: serde_json::Value =
            serde_json::from_slice(&env.to_bytes().unwrap()).unwrap();

        assert_eq!(json["type"], "notice");
        assert_eq!(json["content"]["event"], "user_join");
        assert!(json.get("sender").is_none());
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_serialize_stamped_sender() {
        let user = User::new("u-1", "alice", AccountKind::Member);
        let sender = Participant::common(user, "wonderland");

        let raw = br#"{"type":"text","content":{"text":"hi"},"timestamp":5}"#;
        let env = decode(MessageKind::Text, raw).unwrap().with_sender(sender);

        let json: serde_json::Value =
            serde_json::from_slice(&env.to_bytes().unwrap()).unwrap();
        assert_eq!(json["sender"]["id"], "u-1");
        assert_eq!(json["sender"]["nickname"], "wonderland");
        assert_eq!(json["sender"]["type"], "common");
        assert_eq!(json["timestamp"], 5);
    }
}
