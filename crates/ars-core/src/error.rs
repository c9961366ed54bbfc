//! Error types for the channel core.
//!
//! Connection and history failures are never fatal: they are surfaced to the
//! view as `SessionAction::Report` and the state machines recover on their
//! own (reconnect) or on user request (history retry).

use std::time::Duration;

use ars_proto::{ProtocolError, TeamId};
use thiserror::Error;

/// Errors from the connection state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Handshake did not complete within the connect timeout
    #[error("connect timeout after {elapsed:?}")]
    ConnectTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Transport closed or failed
    #[error("connection closed: {reason}")]
    Closed {
        /// Reason reported by the transport
        reason: String,
    },

    /// Reconnect policy gave up
    #[error("gave up after {attempts} reconnect attempts")]
    RetriesExhausted {
        /// Consecutive failed attempts
        attempts: u32,
    },
}

impl ConnectionError {
    /// Returns true if a later attempt may succeed.
    ///
    /// `RetriesExhausted` is final for the session; a remount starts over.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectTimeout { .. } | Self::Closed { .. })
    }
}

/// Errors from history fetches.
///
/// A failed fetch leaves the message list and pagination cursor unchanged,
/// so every variant is safe to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// No response within the fetch timeout
    #[error("history page {page} timed out after {elapsed:?}")]
    Timeout {
        /// Page that was requested
        page: u32,
        /// How long we waited
        elapsed: Duration,
    },

    /// Request failed or response was unusable
    #[error("history page {page} failed: {reason}")]
    Fetch {
        /// Page that was requested
        page: u32,
        /// Failure description from the driver
        reason: String,
    },
}

impl HistoryError {
    /// Page the failed request asked for.
    pub fn page(&self) -> u32 {
        match self {
            Self::Timeout { page, .. } | Self::Fetch { page, .. } => *page,
        }
    }
}

/// Errors surfaced by a channel session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Live connection problem
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// History fetch problem
    #[error(transparent)]
    History(#[from] HistoryError),

    /// Wire-level problem
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Returns true if the session may recover without a remount.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_transient(),
            Self::History(_) => true,
            Self::Protocol(_) => false,
        }
    }
}

/// Errors from the session registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A session for this team is already mounted
    #[error("team {team_id} already has an active session")]
    AlreadyActive {
        /// Team that is already mounted
        team_id: TeamId,
    },

    /// Session could not be started
    #[error(transparent)]
    Session(#[from] SessionError),
}
