//! Channel-agnostic message envelope.
//!
//! Every transport converts its native payloads into a [`Message`] before
//! handing them to the orchestrator, and converts the orchestrator's reply
//! back into its own wire format:
//! Channel receives → Message → Orchestrator → reply Message → Channel sends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sender id used on every message the agent itself produces.
pub const AGENT_SENDER_ID: &str = "agent";

/// Well-known metadata keys.
///
/// Channels are free to put anything else in the map; these are the keys the
/// core reads or writes:
/// - [`meta::RECIPIENT`]: set on replies to the inbound `sender_id`.
///   The WhatsApp bridge channel reads it to address outbound messages.
/// - [`meta::SESSION_ID`]: supplied by session-tracking channels (web) so the
///   context store can detect a fresh UI session.
/// - [`meta::CONNECTION_ID`]: web socket routing hint, echoed back on replies.
/// - [`meta::ORIGINAL_TYPE`]: set to `"voice"` after transcription.
/// - [`meta::MESSAGE_TYPE`]: the raw type string a channel received, kept
///   when it maps to a coarser [`MessageKind`].
pub mod meta {
    pub const RECIPIENT: &str = "recipient";
    pub const SESSION_ID: &str = "session_id";
    pub const CONNECTION_ID: &str = "connection_id";
    pub const ORIGINAL_TYPE: &str = "original_type";
    pub const MESSAGE_TYPE: &str = "message_type";
}

/// The kind of payload a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Voice,
    Image,
    Video,
    Document,
    Unknown,
}

impl MessageKind {
    /// Map a transport's type string onto a kind. Unrecognized strings become `Unknown`.
    pub fn from_wire(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "text" | "chat" => Self::Text,
            "voice" | "audio" | "ptt" => Self::Voice,
            "image" => Self::Image,
            "video" => Self::Video,
            "document" => Self::Document,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message payload: text, or raw bytes (voice notes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    Binary(Vec<u8>),
}

impl MessageContent {
    /// The text payload, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// The raw payload, if this is binary.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(_) => None,
            Self::Binary(b) => Some(b),
        }
    }
}

impl std::fmt::Display for MessageContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for MessageContent {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

/// A single inbound or outbound message.
///
/// Treated as an immutable value: the `with_*` setters consume and return
/// `self` during construction, and replies are new values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Text or binary payload
    pub content: MessageContent,

    /// Payload kind
    pub kind: MessageKind,

    /// Stable per contact per channel
    pub sender_id: String,

    /// Human-readable sender name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,

    /// Originating channel; `None` for internally synthesized messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// ID of the message being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    #[serde(default)]
    pub is_group: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    /// Channel routing hints, see [`meta`]
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    /// Create a message with an auto-generated id and the current time.
    pub fn new(
        sender_id: impl Into<String>,
        content: impl Into<MessageContent>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            kind,
            sender_id: sender_id.into(),
            sender_name: None,
            channel: None,
            timestamp: Utc::now(),
            reply_to: None,
            is_group: false,
            group_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new text message.
    pub fn text(sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(sender_id, MessageContent::Text(content.into()), MessageKind::Text)
    }

    /// Create a new voice message carrying raw audio bytes.
    pub fn voice(sender_id: impl Into<String>, audio: Vec<u8>) -> Self {
        Self::new(sender_id, MessageContent::Binary(audio), MessageKind::Voice)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    pub fn with_group(mut self, group_id: Option<String>) -> Self {
        self.is_group = true;
        self.group_id = group_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build a text reply to this message.
    pub fn create_reply(&self, content: impl Into<String>) -> Self {
        self.create_reply_with_kind(MessageContent::Text(content.into()), MessageKind::Text)
    }

    /// Build a reply with an explicit kind.
    ///
    /// The reply is sent by [`AGENT_SENDER_ID`], keeps the channel and group
    /// context, and points `reply_to` at this message. Metadata is not copied.
    pub fn create_reply_with_kind(&self, content: impl Into<MessageContent>, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            kind,
            sender_id: AGENT_SENDER_ID.to_string(),
            sender_name: None,
            channel: self.channel.clone(),
            timestamp: Utc::now(),
            reply_to: Some(self.id.clone()),
            is_group: self.is_group,
            group_id: self.group_id.clone(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Look up a string-valued metadata entry.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// The session id supplied by a session-tracking channel, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.meta_str(meta::SESSION_ID)
    }

    pub fn is_text(&self) -> bool {
        self.kind == MessageKind::Text
    }

    pub fn is_voice(&self) -> bool {
        self.kind == MessageKind::Voice
    }

    /// Image, video or document.
    pub fn is_media(&self) -> bool {
        matches!(
            self.kind,
            MessageKind::Image | MessageKind::Video | MessageKind::Document
        )
    }

    /// Short preview for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        let text = self.content.to_string();
        if text.chars().count() <= max_chars {
            text
        } else {
            let cut: String = text.chars().take(max_chars).collect();
            format!("{cut}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> Message {
        Message::text("+15551234567", "status?")
            .with_channel("whatsapp")
            .with_group(Some("ops-room@g.us".into()))
            .with_metadata(meta::SESSION_ID, "abc")
    }

    #[test]
    fn ids_are_generated() {
        let a = Message::text("u", "one");
        let b = Message::text("u", "two");
        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn reply_points_at_original() {
        let msg = inbound();
        let reply = msg.create_reply("All green");
        assert_eq!(reply.reply_to.as_deref(), Some(msg.id.as_str()));
        assert_eq!(reply.channel, msg.channel);
        assert_eq!(reply.sender_id, AGENT_SENDER_ID);
        assert!(reply.is_group);
        assert_eq!(reply.group_id.as_deref(), Some("ops-room@g.us"));
        assert_eq!(reply.content.as_text(), Some("All green"));
        assert!(reply.metadata.is_empty());
    }

    #[test]
    fn reply_to_internal_message_has_no_channel() {
        let msg = Message::text("scheduler", "ping");
        let reply = msg.create_reply("pong");
        assert!(reply.channel.is_none());
    }

    #[test]
    fn kind_predicates() {
        assert!(Message::text("u", "hi").is_text());
        assert!(Message::voice("u", vec![1, 2, 3]).is_voice());

        for kind in [MessageKind::Image, MessageKind::Video, MessageKind::Document] {
            let m = Message::new("u", "file", kind);
            assert!(m.is_media());
            assert!(!m.is_text());
        }
        assert!(!Message::new("u", "?", MessageKind::Unknown).is_media());
    }

    #[test]
    fn kind_from_wire() {
        assert_eq!(MessageKind::from_wire("voice"), MessageKind::Voice);
        assert_eq!(MessageKind::from_wire("IMAGE"), MessageKind::Image);
        assert_eq!(MessageKind::from_wire("sticker"), MessageKind::Unknown);
    }

    #[test]
    fn session_id_from_metadata() {
        assert_eq!(inbound().session_id(), Some("abc"));
        assert_eq!(Message::text("u", "x").session_id(), None);
    }

    #[test]
    fn binary_content_display() {
        let m = Message::voice("u", vec![0; 16]);
        assert_eq!(m.content.to_string(), "<16 bytes>");
        assert!(m.content.as_text().is_none());
    }

    #[test]
    fn preview_truncates() {
        let m = Message::text("u", "abcdefghij");
        assert_eq!(m.preview(4), "abcd...");
        assert_eq!(m.preview(20), "abcdefghij");
    }
}
