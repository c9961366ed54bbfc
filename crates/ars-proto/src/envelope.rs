//! Tagged messages exchanged over the live connection.

use serde::{Deserialize, Serialize};

use crate::{Message, ProtocolError};

/// Live connection envelope, distinguished by its `type` field.
///
/// # Invariants
///
/// - Only [`Envelope::ChatMessage`] carries content for display.
/// - Any other `type` decodes to [`Envelope::Unknown`] instead of failing, so
///   new server-side kinds (presence, typing, ...) are ignored by older
///   clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// A chat message, flattened next to the tag.
    ChatMessage(Message),

    /// Envelope kind this client does not understand.
    #[serde(other)]
    Unknown,
}

impl Envelope {
    /// Decode an envelope from a text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedEnvelope` if the frame is not JSON, has no
    ///   `type`, or a `chat_message` is missing fields.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    /// Encode this envelope as a text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Unencodable` for [`Envelope::Unknown`], which has no
    ///   wire representation of its own.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            Self::ChatMessage(_) => serde_json::to_string(self)
                .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string())),
            Self::Unknown => Err(ProtocolError::Unencodable("unknown")),
        }
    }

    /// Chat message carried by this envelope, if any.
    pub fn into_chat_message(self) -> Option<Message> {
        match self {
            Self::ChatMessage(message) => Some(message),
            Self::Unknown => None,
        }
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Self::ChatMessage(message)
    }
}
