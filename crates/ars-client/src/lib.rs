//! I/O shell for the ARS team chat channel.
//!
//! `ars-core` decides what should happen; this crate makes it happen. It
//! provides:
//!
//! - [`WebSocketTransport`]: the live connection, behind the [`Transport`]
//!   trait so simulations can substitute their own
//! - [`AuthClient`]: bearer-authenticated HTTP with single-flight token refresh
//! - [`HttpHistory`]: history pages over [`AuthClient`], behind the
//!   [`HistorySource`] trait
//! - [`SystemEnv`]: real clocks
//! - [`Runtime`]: the event loop that feeds a
//!   [`SessionRegistry`](ars_core::SessionRegistry) and executes its actions
//!
//! All session state is mutated on the runtime's loop. Handshakes, socket
//! pumps, and history fetches run as spawned tasks that report back over one
//! channel.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod runtime;
pub mod system_env;
pub mod transport;

pub use auth::{AuthClient, TokenSource, Tokens};
pub use config::{HttpConfig, RuntimeConfig};
pub use error::{ClientError, RuntimeError, TransportError};
pub use history::{HistorySource, HttpHistory};
pub use runtime::{Command, Runtime, RuntimeHandle, Services, View};
pub use system_env::SystemEnv;
pub use transport::{Connected, Inbound, Transport, WebSocketTransport};
