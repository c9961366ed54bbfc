//! Wire protocol for the ARS team chat channel.
//!
//! Everything that crosses the network boundary lives here: the chat
//! [`Message`], the tagged [`Envelope`] exchanged over the live connection, the
//! paged [`HistoryPage`] returned by the REST backend, and the [`Endpoints`]
//! that locate both.
//!
//! The crate is pure data. Protocol state machines live in `ars-core` and I/O
//! lives in `ars-client`.
//!
//! # Wire Format
//!
//! Both sources speak JSON. Timestamps are RFC 3339 strings at the boundary
//! and [`time::OffsetDateTime`] everywhere else. Envelopes are internally
//! tagged by a `type` field; unknown tags decode to [`Envelope::Unknown`] so
//! the server can introduce new kinds without breaking older clients.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod endpoint;
mod envelope;
mod error;
mod history;
mod message;

pub use endpoint::Endpoints;
pub use envelope::Envelope;
pub use error::ProtocolError;
pub use history::HistoryPage;
pub use message::{Message, MessageDraft, MessageKey, TeamId};
