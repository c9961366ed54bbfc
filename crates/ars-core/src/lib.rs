//! Sans-IO core of the ARS team chat channel client.
//!
//! Every type here is a pure state machine: it consumes events together with
//! the current time and returns actions for a driver to execute. Nothing in
//! this crate opens sockets, spawns tasks, or reads clocks, which keeps the
//! protocol logic deterministic under simulation.
//!
//! # Components
//!
//! - [`Connection`]: lifecycle of the one live connection per session,
//!   including connect timeouts and reconnect backoff
//! - [`HistoryLoader`]: backward pagination over history pages with a single
//!   in-flight fetch
//! - [`Timeline`]: the ordered, de-duplicated message list shown to the user
//! - [`ChannelSession`]: one team's chat view, composing the three above
//! - [`SessionRegistry`]: at most one live session per team, with stale
//!   result routing
//!
//! # Time
//!
//! State machines are generic over an instant type `I` so production code
//! runs on `std::time::Instant` and tests run on virtual time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod history;
pub mod registry;
pub mod session;
pub mod timeline;

pub use connection::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionId, ConnectionState, ReconnectPolicy,
};
pub use env::Environment;
pub use error::{ConnectionError, HistoryError, RegistryError, SessionError};
pub use history::{FetchKind, HistoryConfig, HistoryLoader, HistoryOutcome, HistoryRequest, RequestId};
pub use registry::{SessionId, SessionRegistry};
pub use session::{ChannelSession, Credential, SessionAction, SessionConfig, SessionEvent};
pub use timeline::{ScrollDirective, Timeline};
