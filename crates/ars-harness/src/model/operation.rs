//! Operations for model-based testing.
//!
//! Operations are everything that can happen to one mounted channel: network
//! events, backend responses, user intents, and the passage of time. They
//! are generated by proptest or decoded from fuzzer bytes and applied through
//! [`ChannelDriver`](super::ChannelDriver).

use arbitrary::Arbitrary;
use ars_proto::Message;
use time::{Duration, OffsetDateTime, macros::datetime};

/// Timestamp of the oldest message a [`SmallMessage`] can expand to.
pub const MODEL_EPOCH: OffsetDateTime = datetime!(2024-05-01 09:00:00 UTC);

const AUTHORS: [&str; 3] = ["alice", "bob", "carol"];

/// Operations that can be applied to a channel.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Current connection attempt completes its handshake.
    HandshakeOk,

    /// Current connection attempt closes or fails.
    TransportDrop,

    /// Server pushes a chat message on the current connection.
    Live {
        /// Message to push.
        message: SmallMessage,
    },

    /// A superseded connection attempt delivers a chat message.
    StaleFrame {
        /// Message to push.
        message: SmallMessage,
    },

    /// Server pushes a frame that is not a valid envelope.
    Garbage {
        /// Raw frame bytes.
        bytes: Vec<u8>,
    },

    /// User scrolls to the top.
    LoadOlder,

    /// User retries the initial load.
    Reload,

    /// Backend answers the outstanding history fetch.
    DeliverHistory {
        /// Page contents.
        page: SmallPage,
    },

    /// Backend answers a fetch that was already superseded or timed out.
    DeliverStale {
        /// Page contents.
        page: SmallPage,
    },

    /// Backend fails the outstanding history fetch.
    FailHistory,

    /// User sends a message.
    Send {
        /// Content seed.
        seed: u8,
    },

    /// Advance time and tick.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },

    /// Unmount the channel.
    Teardown,
}

/// Compact message description.
///
/// The small seed space makes the same message show up in history pages and
/// the live stream often enough to exercise de-duplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallMessage {
    /// Picks content and minute offset.
    pub seed: u8,
    /// Picks one of three authors.
    pub author: u8,
}

impl SmallMessage {
    /// Expand to a wire message.
    pub fn to_message(self) -> Message {
        let author = AUTHORS[usize::from(self.author) % AUTHORS.len()];
        let at = MODEL_EPOCH + Duration::minutes(i64::from(self.seed % 64));
        Message::new(author, format!("m{}", self.seed % 64), at)
    }
}

/// Compact history page description.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub struct SmallPage {
    /// Page contents, in any order.
    pub messages: Vec<SmallMessage>,
    /// Whether an older page exists.
    pub has_next: bool,
}

impl SmallPage {
    /// Expand to chronologically sorted wire messages.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages: Vec<_> = self.messages.iter().map(|m| m.to_message()).collect();
        messages.sort_by_key(|m| m.timestamp);
        messages
    }
}
