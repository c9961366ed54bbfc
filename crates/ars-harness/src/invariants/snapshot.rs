//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture what the user could observe at a point in time.
//! Invariants run against snapshots rather than live sessions so every check
//! in a pass sees the same state.

use std::{collections::HashMap, ops::Sub, time::Duration};

use ars_core::{ChannelSession, ConnectionState, SessionRegistry};
use ars_proto::{Message, TeamId};

use crate::recording_view::RenderedSession;

/// Snapshot of every mounted session.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Team on screen, if any.
    pub current: Option<TeamId>,
    /// Per-session state.
    pub sessions: Vec<SessionSnapshot>,
    /// Connection attempt ids observed per team, oldest first.
    pub connection_history: HashMap<TeamId, Vec<u64>>,
}

impl SystemSnapshot {
    /// Nothing mounted.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single session that is also the one on screen.
    pub fn single(session: SessionSnapshot) -> Self {
        Self { current: Some(session.team.clone()), sessions: vec![session], ..Self::default() }
    }

    /// Capture a registry, with `current` on screen.
    pub fn from_registry<I>(registry: &SessionRegistry<I>, current: Option<&TeamId>) -> Self
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let mut sessions: Vec<_> =
            registry.iter().map(|(id, s)| SessionSnapshot::from_session(id.get(), s)).collect();
        sessions.sort_by_key(|s| s.id);

        Self { current: current.cloned(), sessions, ..Self::default() }
    }

    /// Record a connection attempt id for history checks.
    pub fn record_connection(&mut self, team: TeamId, connection_id: u64) {
        self.connection_history.entry(team).or_default().push(connection_id);
    }
}

/// Snapshot of one session's observable state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: u64,
    /// Team the session is scoped to.
    pub team: TeamId,
    /// Connection state.
    pub state: ConnectionState,
    /// Timeline, oldest first.
    pub messages: Vec<Message>,
    /// Last loaded history page.
    pub page: u32,
    /// Whether a history fetch is outstanding.
    pub loading: bool,
    /// Whether the session was torn down.
    pub closed: bool,
}

impl SessionSnapshot {
    /// Capture a live session.
    pub fn from_session<I>(id: u64, session: &ChannelSession<I>) -> Self
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        Self {
            id,
            team: session.team().clone(),
            state: session.connection_state(),
            messages: session.timeline().to_vec(),
            page: session.page(),
            loading: session.is_loading(),
            closed: session.is_closed(),
        }
    }

    /// Capture what a view was last asked to render.
    pub fn from_rendered(id: u64, rendered: &RenderedSession) -> Self {
        Self {
            id,
            team: rendered.team.clone(),
            state: rendered.state,
            messages: rendered.messages.clone(),
            page: rendered.page,
            loading: rendered.loading,
            closed: rendered.closed,
        }
    }

    /// Empty, connecting session for `team`.
    pub fn new(id: u64, team: impl Into<String>) -> Self {
        Self {
            id,
            team: TeamId::new(team),
            state: ConnectionState::Connecting,
            messages: Vec::new(),
            page: 1,
            loading: false,
            closed: false,
        }
    }

    /// Set the timeline.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Set the connection state.
    pub fn with_state(mut self, state: ConnectionState) -> Self {
        self.state = state;
        self
    }

    /// Mark torn down.
    pub fn torn_down(mut self, loading: bool) -> Self {
        self.closed = true;
        self.loading = loading;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot() {
        let snapshot = SystemSnapshot::empty();
        assert!(snapshot.sessions.is_empty());
        assert!(snapshot.current.is_none());
    }

    #[test]
    fn single_puts_session_on_screen() {
        let snapshot = SystemSnapshot::single(SessionSnapshot::new(3, "t"));

        assert_eq!(snapshot.current, Some(TeamId::new("t")));
        assert_eq!(snapshot.sessions[0].id, 3);
    }
}
