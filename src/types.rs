//! Core types for the stream consumer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Globally unique identifier for a message.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        MessageId(s)
    }
}

/// Position of a message in the stream.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Offset(pub u64);

impl fmt::Debug for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset({})", self.0)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Offset {
    pub const ZERO: Offset = Offset(0);

    pub fn next(self) -> Self {
        Offset(self.0 + 1)
    }
}

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. Clocks set before the epoch read as zero.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Timestamp(millis)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// What a message carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Typing,
    ReadReceipt,
    File,
    System,
    /// Any type string this consumer does not recognize.
    #[serde(other)]
    Unknown,
}

impl Default for MessageKind {
    fn default() -> Self {
        MessageKind::Text
    }
}

/// A single message observed on the stream.
///
/// Immutable once observed: the buffer never edits a message in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub offset: Offset,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub created_at: Timestamp,
}

impl Message {
    /// Build a text message. Mostly useful for tests and the in-process service.
    pub fn text(
        id: impl Into<MessageId>,
        offset: u64,
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            offset: Offset(offset),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            content: content.into(),
            kind: MessageKind::Text,
            created_at: Timestamp::now(),
        }
    }

    /// Whether `peer` is on either side of this message.
    pub fn involves(&self, peer: &str) -> bool {
        self.sender_id == peer || self.recipient_id == peer
    }
}

/// Payload carried by `typing` messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub is_typing: bool,
}

/// Payload carried by `read_receipt` messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptPayload {
    pub message_id: MessageId,
    pub read_at: Timestamp,
}

/// Stream metadata as reported by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub name: String,
    pub message_count: u64,
    pub first_offset: Offset,
    pub last_offset: Offset,
}

/// Health snapshot of the stream service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamHealth {
    pub healthy: bool,
    pub status: String,
    pub checked_at: Timestamp,
}

/// Which transport a session uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Push,
    Pull,
}

/// Lifecycle of the consumer's transport session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session has been started, or the last one was torn down.
    #[default]
    Idle,
    Connecting(TransportKind),
    Active(TransportKind),
    /// The session failed and is waiting for an explicit reconnect.
    Errored,
    /// The remote side closed the stream.
    Closed,
}

/// Who to connect as and where to resume from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionParams {
    pub user_id: String,
    /// Restrict the session to a single counterpart.
    pub peer: Option<String>,
    pub from_offset: Offset,
}

impl SessionParams {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            peer: None,
            from_offset: Offset::ZERO,
        }
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    pub fn from_offset(mut self, offset: Offset) -> Self {
        self.from_offset = offset;
        self
    }
}
