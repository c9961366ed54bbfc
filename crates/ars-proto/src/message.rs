//! Chat message types.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque identifier selecting a team's backend room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(String);

impl TeamId {
    /// Wrap a raw team identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier as sent to the backend.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TeamId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A unit of chat content.
///
/// History pages and the live stream produce the same shape. `timestamp` is
/// the total order key for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author identity as displayed.
    pub username: String,
    /// Raw text body. No length limit is enforced client-side.
    pub content: String,
    /// Instant the message was sent, RFC 3339 on the wire.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Message {
    /// Create a message.
    pub fn new(
        username: impl Into<String>,
        content: impl Into<String>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self { username: username.into(), content: content.into(), timestamp }
    }

    /// Composite de-duplication key.
    pub fn key(&self) -> MessageKey {
        MessageKey {
            username: self.username.clone(),
            content: self.content.clone(),
            timestamp_nanos: self.timestamp.unix_timestamp_nanos(),
        }
    }

    /// Whether `username` authored this message.
    pub fn is_from(&self, username: &str) -> bool {
        self.username == username
    }
}

/// Identity of a message for de-duplication.
///
/// The timestamp is normalized to Unix nanoseconds so the same instant
/// written with different UTC offsets yields the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    username: String,
    content: String,
    timestamp_nanos: i128,
}

/// Outbound message before it is stamped with a send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    /// Author, normally the current user.
    pub username: String,
    /// Text body.
    pub content: String,
}

impl MessageDraft {
    /// Create a draft.
    pub fn new(username: impl Into<String>, content: impl Into<String>) -> Self {
        Self { username: username.into(), content: content.into() }
    }

    /// Drafts with only whitespace are never sent.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Attach the send time, producing a wire message.
    ///
    /// The time is truncated to whole milliseconds, the precision the
    /// backend stores, so the echo of this message carries the same key.
    pub fn stamp(self, sent_at: OffsetDateTime) -> Message {
        let timestamp = sent_at.replace_millisecond(sent_at.millisecond()).unwrap_or(sent_at);
        Message { username: self.username, content: self.content, timestamp }
    }
}
