//! View that records what the runtime asked it to show.

use std::{
    fmt::Write as _,
    ops::Sub,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use ars_client::View;
use ars_core::{ChannelSession, ConnectionState, ScrollDirective, SessionError};
use ars_proto::{Message, TeamId};
use time::macros::format_description;

/// Session state as it was rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSession {
    /// Team on screen
    pub team: TeamId,
    /// Connection state
    pub state: ConnectionState,
    /// Timeline, oldest first
    pub messages: Vec<Message>,
    /// Last loaded history page
    pub page: u32,
    /// Whether an older page exists
    pub has_more: bool,
    /// Whether a fetch is outstanding
    pub loading: bool,
    /// Whether the session was torn down
    pub closed: bool,
}

impl RenderedSession {
    /// Capture `session`.
    pub fn capture<I>(session: &ChannelSession<I>) -> Self
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        Self {
            team: session.team().clone(),
            state: session.connection_state(),
            messages: session.timeline().to_vec(),
            page: session.page(),
            has_more: session.has_more(),
            loading: session.is_loading(),
            closed: session.is_closed(),
        }
    }

    /// Message bodies, oldest first.
    pub fn contents(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.content.as_str()).collect()
    }
}

/// One call into the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// `render`
    Render(RenderedSession),
    /// `scroll`
    Scroll(ScrollDirective),
    /// `report`
    Report {
        /// Team the error belongs to
        team: TeamId,
        /// The error
        error: SessionError,
    },
}

/// Recording [`View`]. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct RecordingView {
    log: Arc<Mutex<Vec<ViewEvent>>>,
}

impl RecordingView {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<ViewEvent> {
        self.lock().clone()
    }

    /// Every render, oldest first.
    pub fn renders(&self) -> Vec<RenderedSession> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Render(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Most recent render.
    pub fn last_render(&self) -> Option<RenderedSession> {
        self.lock().iter().rev().find_map(|e| match e {
            ViewEvent::Render(r) => Some(r.clone()),
            _ => None,
        })
    }

    /// Every scroll directive, oldest first.
    pub fn scrolls(&self) -> Vec<ScrollDirective> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Scroll(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Every reported error, oldest first.
    pub fn reports(&self) -> Vec<(TeamId, SessionError)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Report { team, error } => Some((team.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Human-readable log, one line per event, with consecutive identical
    /// renders collapsed.
    pub fn transcript(&self) -> String {
        let log = self.lock();
        let mut out = String::new();
        let mut previous: Option<&RenderedSession> = None;

        for event in log.iter() {
            match event {
                ViewEvent::Render(r) => {
                    if previous == Some(r) {
                        continue;
                    }
                    previous = Some(r);
                    let _ = writeln!(out, "{}", render_line(r));
                },
                ViewEvent::Scroll(ScrollDirective::ToBottom) => {
                    let _ = writeln!(out, "scroll bottom");
                },
                ViewEvent::Scroll(ScrollDirective::PreserveAnchor { prepended }) => {
                    let _ = writeln!(out, "scroll anchor +{prepended}");
                },
                ViewEvent::Report { team, error } => {
                    let _ = writeln!(out, "report {team}: {error}");
                },
            }
        }
        out
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ViewEvent>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn render_line(r: &RenderedSession) -> String {
    let clock = format_description!("[hour]:[minute]:[second]");
    let messages: Vec<String> = r
        .messages
        .iter()
        .map(|m| {
            let at = m.timestamp.format(clock).unwrap_or_default();
            format!("{at} {}: {}", m.username, m.content)
        })
        .collect();

    let mut flags = Vec::new();
    if r.loading {
        flags.push("loading");
    }
    if r.has_more {
        flags.push("more");
    }
    if r.closed {
        flags.push("torn-down");
    }

    format!(
        "render {} {} page={} [{}] {{{}}}",
        r.team,
        r.state,
        r.page,
        flags.join(","),
        messages.join(" | ")
    )
}

impl<I> View<I> for RecordingView
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn render(&mut self, session: &ChannelSession<I>) {
        self.lock().push(ViewEvent::Render(RenderedSession::capture(session)));
    }

    fn scroll(&mut self, directive: ScrollDirective) {
        self.lock().push(ViewEvent::Scroll(directive));
    }

    fn report(&mut self, team: &TeamId, error: &SessionError) {
        self.lock().push(ViewEvent::Report { team: team.clone(), error: error.clone() });
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn rendered(state: ConnectionState, loading: bool) -> RenderedSession {
        RenderedSession {
            team: TeamId::new("7"),
            state,
            messages: vec![Message::new("bob", "hi", datetime!(2024-05-01 12:00:00 UTC))],
            page: 1,
            has_more: true,
            loading,
            closed: false,
        }
    }

    #[test]
    fn transcript_collapses_repeated_renders() {
        let view = RecordingView::new();
        {
            let mut log = view.lock();
            log.push(ViewEvent::Render(rendered(ConnectionState::Connecting, true)));
            log.push(ViewEvent::Render(rendered(ConnectionState::Connecting, true)));
            log.push(ViewEvent::Render(rendered(ConnectionState::Open, false)));
            log.push(ViewEvent::Scroll(ScrollDirective::PreserveAnchor { prepended: 3 }));
            log.push(ViewEvent::Scroll(ScrollDirective::ToBottom));
        }

        insta::assert_snapshot!(view.transcript().trim_end(), @r"
        render 7 connecting page=1 [loading,more] {12:00:00 bob: hi}
        render 7 open page=1 [more] {12:00:00 bob: hi}
        scroll anchor +3
        scroll bottom
        ");
    }

    #[test]
    fn accessors_filter_by_kind() {
        let view = RecordingView::new();
        let mut sink = view.clone();
        let error = SessionError::Protocol(ars_proto::ProtocolError::Unencodable("unknown"));

        View::<std::time::Instant>::scroll(&mut sink, ScrollDirective::ToBottom);
        View::<std::time::Instant>::report(&mut sink, &TeamId::new("7"), &error);

        assert_eq!(view.scrolls(), vec![ScrollDirective::ToBottom]);
        assert_eq!(view.reports(), vec![(TeamId::new("7"), error)]);
        assert!(view.last_render().is_none());

        view.clear();
        assert!(view.events().is_empty());
    }
}
