//! Deterministic simulation harness for the ARS team chat channel.
//!
//! In-memory implementations of the Environment, Transport and HistorySource
//! seams, plus a recording View, so the real runtime can be driven through
//! reconnects, slow backends and team switches on tokio's paused clock.
//!
//! # Model-Based Testing
//!
//! The `model` module applies random [`Operation`]s to a real
//! [`ChannelSession`](ars_core::ChannelSession) and tracks what its timeline
//! should contain, independently of the merge code.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after every
//! step. Use [`InvariantRegistry::standard()`] for the channel invariants.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod invariants;
pub mod model;
pub mod recording_view;
pub mod scenario;
pub mod sim_env;
pub mod sim_history;
pub mod sim_transport;

pub use invariants::{
    ConnectionIdsMonotonic, CurrentSessionMounted, Invariant, InvariantRegistry, InvariantResult,
    NoDuplicateMessages, PageCursorValid, SessionSnapshot, SingleSessionPerTeam, SystemSnapshot,
    TimelineOrdered, TornDownIsQuiet, Violation,
};
pub use model::{ChannelDriver, MODEL_EPOCH, MODEL_TEAM, Operation, SmallMessage, SmallPage};
pub use recording_view::{RecordingView, RenderedSession, ViewEvent};
pub use scenario::{SIM_BACKEND, Scenario, ScenarioBuilder, SimTokens};
pub use sim_env::{SIM_EPOCH, SimEnv};
pub use sim_history::SimHistory;
pub use sim_transport::{ConnectOutcome, SimPeer, SimServer, SimTransport};
