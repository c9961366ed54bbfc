//! Standard invariant checks.
//!
//! These capture behavioral properties that must hold after every step,
//! whatever order events arrived in.

use std::collections::HashSet;

use ars_core::ConnectionState;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Timeline is in non-decreasing timestamp order.
pub struct TimelineOrdered;

impl Invariant for TimelineOrdered {
    fn name(&self) -> &'static str {
        "timeline_ordered"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            if let Some(i) = session.messages.windows(2).position(|w| w[0].timestamp > w[1].timestamp)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "team {}: message {} at {} precedes message {} at {}",
                        session.team,
                        i,
                        session.messages[i].timestamp,
                        i + 1,
                        session.messages[i + 1].timestamp
                    ),
                });
            }
        }
        Ok(())
    }
}

/// No message appears twice in a timeline.
///
/// Identity is `(username, content, timestamp)`. A repeat means a history
/// page and the live stream both delivered it and the merge kept both.
pub struct NoDuplicateMessages;

impl Invariant for NoDuplicateMessages {
    fn name(&self) -> &'static str {
        "no_duplicate_messages"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in &state.sessions {
            let mut seen = HashSet::with_capacity(session.messages.len());
            for message in &session.messages {
                if !seen.insert(message.key()) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "team {}: duplicate {}: {:?} at {}",
                            session.team, message.username, message.content, message.timestamp
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The team on screen has a mounted session.
pub struct CurrentSessionMounted;

impl Invariant for CurrentSessionMounted {
    fn name(&self) -> &'static str {
        "current_session_mounted"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let Some(current) = &state.current else {
            return Ok(());
        };

        if state.sessions.iter().any(|s| &s.team == current && !s.closed) {
            return Ok(());
        }

        Err(Violation {
            invariant: self.name(),
            message: format!(
                "team {current} on screen but mounted teams are {:?}",
                state.sessions.iter().map(|s| s.team.as_str()).collect::<Vec<_>>()
            ),
        })
    }
}

/// At most one live session per team.
pub struct SingleSessionPerTeam;

impl Invariant for SingleSessionPerTeam {
    fn name(&self) -> &'static str {
        "single_session_per_team"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut teams = HashSet::new();
        for session in state.sessions.iter().filter(|s| !s.closed) {
            if !teams.insert(&session.team) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("team {} mounted twice", session.team),
                });
            }
        }
        Ok(())
    }
}

/// A torn-down session has no connection and no outstanding fetch.
pub struct TornDownIsQuiet;

impl Invariant for TornDownIsQuiet {
    fn name(&self) -> &'static str {
        "torn_down_is_quiet"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for session in state.sessions.iter().filter(|s| s.closed) {
            if session.state != ConnectionState::Closed || session.loading {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "team {}: torn down but state={} loading={}",
                        session.team, session.state, session.loading
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Connection attempt ids never go backwards.
///
/// A decrease would mean a stale attempt became current again, letting its
/// frames reach the timeline.
pub struct ConnectionIdsMonotonic;

impl Invariant for ConnectionIdsMonotonic {
    fn name(&self) -> &'static str {
        "connection_ids_monotonic"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (team, history) in &state.connection_history {
            if let Some(w) = history.windows(2).find(|w| w[1] < w[0]) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("team {team}: connection id went from {} to {}", w[0], w[1]),
                });
            }
        }
        Ok(())
    }
}

/// History cursor starts at page 1 and never drops below it.
pub struct PageCursorValid;

impl Invariant for PageCursorValid {
    fn name(&self) -> &'static str {
        "page_cursor_valid"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        match state.sessions.iter().find(|s| s.page == 0) {
            Some(session) => Err(Violation {
                invariant: self.name(),
                message: format!("team {}: page cursor is 0", session.team),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use ars_proto::{Message, TeamId};
    use time::macros::datetime;

    use super::*;
    use crate::invariants::SessionSnapshot;

    fn message(content: &str, minute: u8) -> Message {
        let at = datetime!(2024-05-01 12:00:00 UTC) + time::Duration::minutes(minute.into());
        Message::new("alice", content, at)
    }

    #[test]
    fn ordered_timeline_passes() {
        let session =
            SessionSnapshot::new(1, "t").with_messages(vec![message("a", 0), message("b", 1)]);
        assert!(TimelineOrdered.check(&SystemSnapshot::single(session)).is_ok());
    }

    #[test]
    fn out_of_order_timeline_fails() {
        let session =
            SessionSnapshot::new(1, "t").with_messages(vec![message("b", 1), message("a", 0)]);

        let result = TimelineOrdered.check(&SystemSnapshot::single(session));
        assert!(result.is_err_and(|v| v.message.contains("message 0")));
    }

    #[test]
    fn duplicate_message_fails() {
        let session =
            SessionSnapshot::new(1, "t").with_messages(vec![message("a", 0), message("a", 0)]);

        let result = NoDuplicateMessages.check(&SystemSnapshot::single(session));
        assert!(result.is_err_and(|v| v.invariant == "no_duplicate_messages"));
    }

    #[test]
    fn same_content_different_time_is_not_duplicate() {
        let session =
            SessionSnapshot::new(1, "t").with_messages(vec![message("a", 0), message("a", 1)]);
        assert!(NoDuplicateMessages.check(&SystemSnapshot::single(session)).is_ok());
    }

    #[test]
    fn current_team_must_be_mounted() {
        let mut snapshot = SystemSnapshot::single(SessionSnapshot::new(1, "t"));
        assert!(CurrentSessionMounted.check(&snapshot).is_ok());

        snapshot.current = Some(TeamId::new("other"));
        let result = CurrentSessionMounted.check(&snapshot);
        assert!(result.is_err_and(|v| v.message.contains("other")));
    }

    #[test]
    fn two_live_sessions_for_one_team_fail() {
        let snapshot = SystemSnapshot {
            sessions: vec![SessionSnapshot::new(1, "t"), SessionSnapshot::new(2, "t")],
            ..SystemSnapshot::default()
        };
        assert!(SingleSessionPerTeam.check(&snapshot).is_err());
    }

    #[test]
    fn torn_down_session_must_be_idle() {
        let quiet = SessionSnapshot::new(1, "t").with_state(ConnectionState::Closed).torn_down(false);
        assert!(TornDownIsQuiet.check(&SystemSnapshot::single(quiet)).is_ok());

        let busy = SessionSnapshot::new(1, "t").with_state(ConnectionState::Closed).torn_down(true);
        assert!(TornDownIsQuiet.check(&SystemSnapshot::single(busy)).is_err());

        let open = SessionSnapshot::new(1, "t").with_state(ConnectionState::Open).torn_down(false);
        assert!(TornDownIsQuiet.check(&SystemSnapshot::single(open)).is_err());
    }

    #[test]
    fn connection_id_decrease_fails() {
        let mut snapshot = SystemSnapshot::empty();
        snapshot.record_connection(TeamId::new("t"), 1);
        snapshot.record_connection(TeamId::new("t"), 2);
        assert!(ConnectionIdsMonotonic.check(&snapshot).is_ok());

        snapshot.record_connection(TeamId::new("t"), 1);
        let result = ConnectionIdsMonotonic.check(&snapshot);
        assert!(result.is_err_and(|v| v.message.contains("from 2 to 1")));
    }

    #[test]
    fn zero_page_cursor_fails() {
        let mut session = SessionSnapshot::new(1, "t");
        session.page = 0;
        assert!(PageCursorValid.check(&SystemSnapshot::single(session)).is_err());
    }
}
