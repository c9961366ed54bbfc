//! Paged history responses.

use serde::{Deserialize, Serialize};

use crate::{Message, ProtocolError};

/// One page of past messages.
///
/// Page 1 is the most recent page; higher page numbers move into the past.
/// Messages within a page are chronological.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Messages in chronological order.
    pub messages: Vec<Message>,
    /// Whether a further-older page exists. Absent means `false`.
    #[serde(default)]
    pub has_next: bool,
}

impl HistoryPage {
    /// Create a page.
    pub fn new(messages: Vec<Message>, has_next: bool) -> Self {
        Self { messages, has_next }
    }

    /// Decode a page from a response body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedHistory` if the body does not match the
    ///   page schema.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(body).map_err(|e| ProtocolError::MalformedHistory(e.to_string()))
    }
}
