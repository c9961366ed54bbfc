//! Append-only terminal rendering.
//!
//! A line terminal cannot redraw, so [`TerminalView`] prints the difference
//! between renders: messages it has not printed yet, plus a status line
//! whenever the team or connection state changes. Messages are printed as
//! `HH:MM:SS username: content`, with own messages marked by `*`. Messages
//! older than anything already on screen, such as an older history page, are
//! printed as a fenced block of earlier messages.

use std::{collections::HashSet, io::Write, ops::Sub, time::Duration};

use ars_client::View;
use ars_core::{ChannelSession, ConnectionState, ScrollDirective, SessionError};
use ars_proto::{Message, MessageKey, TeamId};
use time::{OffsetDateTime, macros::format_description};
use tracing::warn;

/// Format one chat line.
pub fn message_line(message: &Message, own: bool) -> String {
    let clock = format_description!("[hour]:[minute]:[second]");
    let at = message.timestamp.format(clock).unwrap_or_default();
    let marker = if own { "*" } else { "" };
    format!("{at} {marker}{}: {}", message.username, message.content)
}

/// [`View`] that writes lines to `W`.
#[derive(Debug)]
pub struct TerminalView<W> {
    out: W,
    team: Option<TeamId>,
    state: Option<ConnectionState>,
    printed: HashSet<MessageKey>,
    newest: Option<OffsetDateTime>,
}

impl<W: Write> TerminalView<W> {
    /// Print to `out`.
    pub fn new(out: W) -> Self {
        Self { out, team: None, state: None, printed: HashSet::new(), newest: None }
    }

    /// Print a status line.
    pub fn status(&mut self, text: &str) {
        self.line(&format!("-- {text}"));
    }

    /// Writer this view prints to.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            warn!(error = %e, "terminal write failed");
        }
    }
}

impl<W, I> View<I> for TerminalView<W>
where
    W: Write + Send + 'static,
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn render(&mut self, session: &ChannelSession<I>) {
        if self.team.as_ref() != Some(session.team()) {
            self.team = Some(session.team().clone());
            self.state = None;
            self.printed.clear();
            self.newest = None;
            self.status(&format!("team {}", session.team()));
        }

        let state = session.connection_state();
        if self.state != Some(state) {
            self.state = Some(state);
            self.status(&format!("{}: {state}", session.team()));
        }

        let mut earlier = Vec::new();
        let mut later = Vec::new();
        for message in session.timeline().iter() {
            if !self.printed.insert(message.key()) {
                continue;
            }
            let line = message_line(message, session.is_own(message));
            if self.newest.is_some_and(|newest| message.timestamp < newest) {
                earlier.push(line);
            } else {
                later.push(line);
            }
        }

        if !earlier.is_empty() {
            self.status("earlier messages");
            for line in &earlier {
                self.line(line);
            }
            self.status("end of earlier messages");
        }
        for line in &later {
            self.line(line);
        }

        if let Some(last) = session.timeline().last() {
            self.newest = Some(self.newest.map_or(last.timestamp, |n| n.max(last.timestamp)));
        }
    }

    // Earlier messages are fenced in place of an anchored scroll
    fn scroll(&mut self, _directive: ScrollDirective) {}

    fn report(&mut self, team: &TeamId, error: &SessionError) {
        self.line(&format!("!! {team}: {error}"));
    }
}
