//! Live connection state machine.
//!
//! Tracks the one streaming connection a channel session owns: the handshake,
//! unexpected closes, the connect timeout, and reconnect backoff. Uses the
//! action pattern: methods take time as input and return actions for the
//! driver to execute.
//!
//! # State Machine
//!
//! ```text
//!              open()         handshake ok
//!   ──────────────> ┌────────────┐ ───────────> ┌──────┐
//!                   │ Connecting │              │ Open │
//!                   └────────────┘ <──┐         └──────┘
//!                         │           │            │
//!       timeout / failure │  retry    │            │ transport closed
//!                         ↓  timer    │            ↓
//!                   ┌────────────┐ ───┘            │
//!                   │   Closed   │ <───────────────┘
//!                   └────────────┘
//! ```
//!
//! `close()` is teardown: it moves to `Closed` from any state and cancels any
//! pending retry. After teardown nothing reopens the connection.
//!
//! # Attempt identity
//!
//! Every attempt gets a fresh [`ConnectionId`]. Transport events carry the
//! id they were produced for, and events for any id other than the current
//! attempt are ignored. A slow handshake that completes after its attempt
//! timed out can therefore never revive a closed connection.

use std::{
    fmt,
    ops::Sub,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::error::ConnectionError;

/// Time allowed for the handshake before the attempt is abandoned.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of reconnect attempts after an unexpected close.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay before the first reconnect attempt.
pub const DEFAULT_INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Ceiling for the exponential reconnect delay.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Identifier of one connection attempt, unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw attempt number.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw attempt number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state as surfaced to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Frames may be sent and received
    Open,
    /// No connection; a retry may be pending
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

/// Reconnect behaviour after an unexpected close.
///
/// The delay before attempt `n` (0-based) is
/// `min(initial_delay * 2^n, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts before giving up. Zero disables reconnect.
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub initial_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Policy under which `Closed` is terminal.
    pub fn disabled() -> Self {
        Self { max_attempts: 0, ..Self::default() }
    }

    /// Whether any reconnect will ever be attempted.
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before attempt `attempt`, or `None` once attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_RECONNECT_DELAY,
            max_delay: DEFAULT_MAX_RECONNECT_DELAY,
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout for completing the handshake
    pub connect_timeout: Duration,
    /// Reconnect behaviour after unexpected closes
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { connect_timeout: DEFAULT_CONNECT_TIMEOUT, reconnect: ReconnectPolicy::default() }
    }
}

/// Actions returned by the connection state machine.
///
/// The driver executes these:
/// - `Open`: start a handshake for this attempt
/// - `Close`: drop the transport for this attempt, if any is left
/// - `Report`: surface the error to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Start a new connection attempt
    Open {
        /// Attempt the transport events must carry
        id: ConnectionId,
    },

    /// Drop the transport of this attempt
    Close {
        /// Attempt to drop
        id: ConnectionId,
    },

    /// Surface an error
    Report(ConnectionError),
}

/// Connection state machine
///
/// Pure state machine: no I/O, time is passed as parameters.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    /// Current attempt
    current: ConnectionId,
    /// When the current state was entered
    state_since: I,
    /// Consecutive failed attempts since the last successful open
    failures: u32,
    /// Pending reconnect, measured from `state_since`
    retry_after: Option<Duration>,
    /// Set by `close()`; nothing reopens afterwards
    torn_down: bool,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Start the first attempt.
    ///
    /// Returns the connection in [`ConnectionState::Connecting`] and the
    /// `Open` action for attempt 1.
    pub fn open(now: I, config: ConnectionConfig) -> (Self, Vec<ConnectionAction>) {
        let current = ConnectionId::new(1);
        let connection = Self {
            state: ConnectionState::Connecting,
            config,
            current,
            state_since: now,
            failures: 0,
            retry_after: None,
            torn_down: false,
        };

        debug!(connection = %current, "connecting");
        (connection, vec![ConnectionAction::Open { id: current }])
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current attempt
    pub fn id(&self) -> ConnectionId {
        self.current
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay of the pending reconnect, if one is scheduled.
    pub fn pending_retry(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Whether `close()` has been called.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Attempt to send on, if frames may be sent right now.
    pub fn can_send(&self) -> Option<ConnectionId> {
        (self.state == ConnectionState::Open).then_some(self.current)
    }

    /// Handshake of attempt `id` completed.
    ///
    /// Ignored unless `id` is the current attempt and still connecting.
    pub fn handle_opened(&mut self, id: ConnectionId, now: I) -> Vec<ConnectionAction> {
        if !self.is_current(id) || self.state != ConnectionState::Connecting {
            debug!(connection = %id, state = %self.state, "ignoring stale open");
            return Vec::new();
        }

        self.state = ConnectionState::Open;
        self.state_since = now;
        self.failures = 0;

        info!(connection = %id, "connection open");
        Vec::new()
    }

    /// Transport of attempt `id` closed or failed.
    ///
    /// Moves to `Closed` and schedules a retry if the policy permits.
    pub fn handle_closed(
        &mut self,
        id: ConnectionId,
        reason: impl Into<String>,
        now: I,
    ) -> Vec<ConnectionAction> {
        if !self.is_current(id) || self.state == ConnectionState::Closed {
            debug!(connection = %id, state = %self.state, "ignoring stale close");
            return Vec::new();
        }

        let reason = reason.into();
        warn!(connection = %id, %reason, "connection closed");

        let mut actions = vec![ConnectionAction::Close { id }];
        actions.extend(self.fail(ConnectionError::Closed { reason }, now));
        actions
    }

    /// Tear the connection down.
    ///
    /// Idempotent and terminal: cancels any pending retry, and returns a
    /// `Close` only if the connection was not already closed.
    pub fn close(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.torn_down {
            return Vec::new();
        }

        self.torn_down = true;
        self.retry_after = None;

        let was = self.state;
        self.state = ConnectionState::Closed;
        self.state_since = now;

        debug!(connection = %self.current, from = %was, "connection torn down");
        if was == ConnectionState::Closed {
            Vec::new()
        } else {
            vec![ConnectionAction::Close { id: self.current }]
        }
    }

    /// Process timeouts and due reconnects.
    ///
    /// Call periodically.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.torn_down {
            return Vec::new();
        }

        let elapsed = now - self.state_since;

        match self.state {
            ConnectionState::Connecting if elapsed > self.config.connect_timeout => {
                warn!(connection = %self.current, ?elapsed, "connect timeout");

                let mut actions = vec![ConnectionAction::Close { id: self.current }];
                actions.extend(self.fail(ConnectionError::ConnectTimeout { elapsed }, now));
                actions
            },
            ConnectionState::Closed => match self.retry_after {
                Some(delay) if elapsed >= delay => {
                    self.retry_after = None;
                    self.current = ConnectionId::new(self.current.get() + 1);
                    self.state = ConnectionState::Connecting;
                    self.state_since = now;

                    info!(connection = %self.current, attempt = self.failures, "reconnecting");
                    vec![ConnectionAction::Open { id: self.current }]
                },
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        !self.torn_down && id == self.current
    }

    fn fail(&mut self, error: ConnectionError, now: I) -> Vec<ConnectionAction> {
        self.state = ConnectionState::Closed;
        self.state_since = now;

        let mut actions = vec![ConnectionAction::Report(error)];

        match self.config.reconnect.delay_for(self.failures) {
            Some(delay) => {
                self.failures += 1;
                self.retry_after = Some(delay);
                debug!(connection = %self.current, ?delay, attempt = self.failures, "retry scheduled");
            },
            None => {
                self.retry_after = None;
                if self.config.reconnect.is_enabled() {
                    warn!(attempts = self.failures, "reconnect attempts exhausted");
                    actions.push(ConnectionAction::Report(ConnectionError::RetriesExhausted {
                        attempts: self.failures,
                    }));
                }
            },
        }

        actions
    }
}
