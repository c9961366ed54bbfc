//! One team's chat view.
//!
//! A [`ChannelSession`] composes the live [`Connection`], the
//! [`HistoryLoader`], and the [`Timeline`] behind a single event/action
//! interface. The driver feeds it transport events, history results, and
//! ticks; user intents arrive through `send`, `load_older`, and `reload`.
//!
//! # Lifecycle
//!
//! ```text
//! start() ──> Connect + FetchHistory(page 1)
//!   ...
//! close() ──> Disconnect, then every event is ignored
//! ```
//!
//! A closed session is never reused; a remount starts a new one with a new
//! connection and a fresh pagination cursor.

use std::{
    fmt,
    ops::Sub,
    time::{Duration, Instant},
};

use ars_proto::{Endpoints, Envelope, HistoryPage, Message, MessageDraft, ProtocolError, TeamId};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionId, ConnectionState},
    error::SessionError,
    history::{HistoryConfig, HistoryLoader, HistoryOutcome, HistoryRequest, RequestId},
    timeline::{ScrollDirective, Timeline},
};

/// Access token presented on the live connection.
///
/// Debug output is redacted so the token never reaches logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for building the connection URL.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Session configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Live connection settings
    pub connection: ConnectionConfig,
    /// History fetch settings
    pub history: HistoryConfig,
}

/// Inputs from the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake of this attempt succeeded
    TransportOpened {
        /// Attempt from the `Connect` action
        connection_id: ConnectionId,
    },

    /// Transport of this attempt closed or failed
    TransportClosed {
        /// Attempt from the `Connect` action
        connection_id: ConnectionId,
        /// Close reason or error description
        reason: String,
    },

    /// Text frame received on this attempt
    FrameReceived {
        /// Attempt from the `Connect` action
        connection_id: ConnectionId,
        /// Raw frame text
        text: String,
    },

    /// History fetch succeeded
    HistoryLoaded {
        /// Id from the `FetchHistory` action
        request_id: RequestId,
        /// Decoded response
        page: HistoryPage,
    },

    /// History fetch failed
    HistoryFailed {
        /// Id from the `FetchHistory` action
        request_id: RequestId,
        /// Failure description
        reason: String,
    },

    /// Periodic maintenance (timeouts and reconnects)
    Tick,
}

/// Outputs for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open a live connection to `url` and report its events as
    /// `connection_id`
    Connect {
        /// Attempt identity
        connection_id: ConnectionId,
        /// Full connection URL, credential included
        url: Url,
    },

    /// Drop the transport of this attempt
    Disconnect {
        /// Attempt to drop
        connection_id: ConnectionId,
    },

    /// Send a text frame on this attempt
    SendFrame {
        /// Attempt to send on
        connection_id: ConnectionId,
        /// Encoded envelope
        text: String,
    },

    /// Fetch a history page and report it with the request id
    FetchHistory(HistoryRequest),

    /// Adjust the view's scroll position after the next layout
    Scroll(ScrollDirective),

    /// Session state changed; redraw
    Render,

    /// Surface an error to the user
    Report(SessionError),
}

/// Channel session state machine
#[derive(Debug, Clone)]
pub struct ChannelSession<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    team: TeamId,
    username: String,
    credential: Credential,
    endpoints: Endpoints,
    connection: Connection<I>,
    history: HistoryLoader<I>,
    timeline: Timeline,
    last_error: Option<SessionError>,
    closed: bool,
}

impl<I> ChannelSession<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Mount a session for `team`.
    ///
    /// Returns the session and the mount actions: `Connect` for the first
    /// attempt and `FetchHistory` for page 1.
    ///
    /// # Errors
    ///
    /// - `SessionError::Protocol` if `team` is empty
    pub fn start(
        team: TeamId,
        username: impl Into<String>,
        credential: Credential,
        endpoints: Endpoints,
        config: SessionConfig,
        now: I,
    ) -> Result<(Self, Vec<SessionAction>), SessionError> {
        if team.as_str().is_empty() {
            return Err(ProtocolError::InvalidEndpoint("empty team id".to_string()).into());
        }

        let (connection, opened) = Connection::open(now, config.connection);
        let history = HistoryLoader::new(team.clone(), config.history);

        let mut session = Self {
            team,
            username: username.into(),
            credential,
            endpoints,
            connection,
            history,
            timeline: Timeline::new(),
            last_error: None,
            closed: false,
        };

        info!(team = %session.team, "session mounted");

        let mut actions = session.connection_actions(opened);
        actions.push(SessionAction::FetchHistory(session.history.load_initial(now)));
        Ok((session, actions))
    }

    /// Team this session is scoped to.
    pub fn team(&self) -> &TeamId {
        &self.team
    }

    /// Current user.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Live connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Current connection attempt.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    /// Last loaded history page.
    pub fn page(&self) -> u32 {
        self.history.page()
    }

    /// Whether an older history page exists.
    pub fn has_more(&self) -> bool {
        self.history.has_more()
    }

    /// Whether a history fetch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.history.is_loading()
    }

    /// Displayed messages.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Most recently surfaced error.
    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    /// Whether the session was torn down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the current user wrote `message`.
    pub fn is_own(&self, message: &Message) -> bool {
        message.is_from(&self.username)
    }

    /// Replace the access token used for future connection attempts.
    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = credential;
    }

    /// Process a driver event.
    pub fn handle(&mut self, event: SessionEvent, now: I) -> Vec<SessionAction> {
        if self.closed {
            debug!(team = %self.team, ?event, "ignoring event for closed session");
            return Vec::new();
        }

        match event {
            SessionEvent::TransportOpened { connection_id } => {
                let before = self.connection.state();
                let actions = self.connection.handle_opened(connection_id, now);
                self.after_connection(before, actions)
            },
            SessionEvent::TransportClosed { connection_id, reason } => {
                let before = self.connection.state();
                let actions = self.connection.handle_closed(connection_id, reason, now);
                self.after_connection(before, actions)
            },
            SessionEvent::FrameReceived { connection_id, text } => {
                self.handle_frame(connection_id, &text)
            },
            SessionEvent::HistoryLoaded { request_id, page } => {
                self.handle_history(request_id, page)
            },
            SessionEvent::HistoryFailed { request_id, reason } => {
                match self.history.handle_failed(request_id, reason) {
                    Some(err) => vec![self.report(err.into()), SessionAction::Render],
                    None => Vec::new(),
                }
            },
            SessionEvent::Tick => {
                let before = self.connection.state();
                let actions = self.connection.tick(now);
                let mut out = self.after_connection(before, actions);

                if let Some(err) = self.history.tick(now) {
                    out.push(self.report(err.into()));
                    out.push(SessionAction::Render);
                }
                out
            },
        }
    }

    /// Send a message.
    ///
    /// Stamps the draft with `sent_at` and sends it only while the
    /// connection is open. Blank drafts and sends in any other state are
    /// silently dropped. The message is not added locally; it appears when
    /// the server echoes it back.
    pub fn send(&mut self, draft: MessageDraft, sent_at: OffsetDateTime) -> Vec<SessionAction> {
        if self.closed || draft.is_blank() {
            return Vec::new();
        }

        let Some(connection_id) = self.connection.can_send() else {
            debug!(team = %self.team, state = %self.connection.state(), "not open, dropping send");
            return Vec::new();
        };

        match Envelope::from(draft.stamp(sent_at)).encode() {
            Ok(text) => vec![
                SessionAction::SendFrame { connection_id, text },
                SessionAction::Scroll(ScrollDirective::ToBottom),
            ],
            Err(err) => vec![self.report(err.into())],
        }
    }

    /// Load the next older history page, if there is one and nothing is in
    /// flight.
    pub fn load_older(&mut self, now: I) -> Vec<SessionAction> {
        if self.closed {
            return Vec::new();
        }

        match self.history.load_older(now) {
            Some(request) => vec![SessionAction::FetchHistory(request), SessionAction::Render],
            None => Vec::new(),
        }
    }

    /// Retry the initial history load, superseding any outstanding fetch.
    pub fn reload(&mut self, now: I) -> Vec<SessionAction> {
        if self.closed {
            return Vec::new();
        }

        let request = self.history.load_initial(now);
        vec![SessionAction::FetchHistory(request), SessionAction::Render]
    }

    /// Tear the session down.
    ///
    /// Idempotent. Drops the outstanding history fetch and closes the
    /// connection; afterwards every event and intent is ignored.
    pub fn close(&mut self, now: I) -> Vec<SessionAction> {
        if self.closed {
            return Vec::new();
        }

        self.closed = true;
        self.history.cancel();

        let closed = self.connection.close(now);
        let mut actions = self.connection_actions(closed);
        actions.push(SessionAction::Render);

        info!(team = %self.team, "session closed");
        actions
    }

    fn handle_frame(&mut self, connection_id: ConnectionId, text: &str) -> Vec<SessionAction> {
        if self.connection.can_send() != Some(connection_id) {
            debug!(team = %self.team, connection = %connection_id, "dropping frame from stale connection");
            return Vec::new();
        }

        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(team = %self.team, %err, "dropping undecodable frame");
                return Vec::new();
            },
        };

        let Some(message) = envelope.into_chat_message() else {
            debug!(team = %self.team, "ignoring non-chat envelope");
            return Vec::new();
        };

        match self.timeline.append_live(message) {
            Some(scroll) => vec![SessionAction::Render, SessionAction::Scroll(scroll)],
            None => Vec::new(),
        }
    }

    fn handle_history(&mut self, request_id: RequestId, page: HistoryPage) -> Vec<SessionAction> {
        let Some(outcome) = self.history.handle_loaded(request_id, page) else {
            return Vec::new();
        };

        let scroll = match outcome {
            HistoryOutcome::Replace(messages) => Some(self.timeline.replace(messages)),
            HistoryOutcome::Prepend(messages) => self.timeline.prepend(messages),
        };

        let mut actions = vec![SessionAction::Render];
        actions.extend(scroll.map(SessionAction::Scroll));
        actions
    }

    fn after_connection(
        &mut self,
        before: ConnectionState,
        actions: Vec<ConnectionAction>,
    ) -> Vec<SessionAction> {
        let mut out = self.connection_actions(actions);
        if self.connection.state() != before {
            out.push(SessionAction::Render);
        }
        out
    }

    fn connection_actions(&mut self, actions: Vec<ConnectionAction>) -> Vec<SessionAction> {
        actions
            .into_iter()
            .map(|action| match action {
                ConnectionAction::Open { id } => SessionAction::Connect {
                    connection_id: id,
                    url: self.endpoints.channel(&self.team, self.credential.expose()),
                },
                ConnectionAction::Close { id } => SessionAction::Disconnect { connection_id: id },
                ConnectionAction::Report(err) => self.report(err.into()),
            })
            .collect()
    }

    fn report(&mut self, err: SessionError) -> SessionAction {
        self.last_error = Some(err.clone());
        SessionAction::Report(err)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn start() -> (ChannelSession, Instant, Vec<SessionAction>) {
        let t0 = Instant::now();
        let endpoints = Endpoints::parse("http://localhost:8000").unwrap();
        let (session, actions) = ChannelSession::start(
            TeamId::new("team-1"),
            "alice",
            Credential::new("tok"),
            endpoints,
            SessionConfig::default(),
            t0,
        )
        .unwrap();
        (session, t0, actions)
    }

    fn open(session: &mut ChannelSession, now: Instant) {
        let connection_id = session.connection_id();
        session.handle(SessionEvent::TransportOpened { connection_id }, now);
    }

    #[test]
    fn mount_connects_and_fetches_first_page() {
        let (session, _, actions) = start();

        assert_eq!(actions.len(), 2);
        assert!(matches!(
            &actions[0],
            SessionAction::Connect { url, .. }
                if url.as_str() == "ws://localhost:8000/ws/team/team-1/?access_token=tok"
        ));
        assert!(matches!(
            &actions[1],
            SessionAction::FetchHistory(HistoryRequest { page: 1, .. })
        ));
        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        assert!(session.is_loading());
    }

    #[test]
    fn empty_team_is_rejected() {
        let result = ChannelSession::<Instant>::start(
            TeamId::new(""),
            "alice",
            Credential::new("tok"),
            Endpoints::parse("http://h").unwrap(),
            SessionConfig::default(),
            Instant::now(),
        );

        assert!(matches!(result, Err(SessionError::Protocol(_))));
    }

    #[test]
    fn credential_debug_is_redacted() {
        assert_eq!(format!("{:?}", Credential::new("secret")), "Credential(<redacted>)");
    }

    #[test]
    fn send_while_open_emits_frame_and_scroll() {
        let (mut session, t0, _) = start();
        open(&mut session, t0);

        let sent_at = datetime!(2024-05-01 12:00:00 UTC);
        let actions = session.send(MessageDraft::new("alice", "hi"), sent_at);

        assert_eq!(actions.len(), 2);
        let SessionAction::SendFrame { text, .. } = &actions[0] else {
            unreachable!("expected SendFrame, got {:?}", actions[0]);
        };
        let envelope = Envelope::decode(text).unwrap();
        assert_eq!(envelope.into_chat_message(), Some(Message::new("alice", "hi", sent_at)));
        assert_eq!(actions[1], SessionAction::Scroll(ScrollDirective::ToBottom));

        // Not added until the server echoes it
        assert!(session.timeline().is_empty());
    }

    #[test]
    fn blank_send_is_dropped() {
        let (mut session, t0, _) = start();
        open(&mut session, t0);

        let actions = session.send(MessageDraft::new("alice", "   "), datetime!(2024-05-01 12:00 UTC));
        assert!(actions.is_empty());
    }

    #[test]
    fn frames_from_old_attempts_are_dropped() {
        let (mut session, t0, _) = start();
        let stale = session.connection_id();
        session.handle(
            SessionEvent::TransportClosed { connection_id: stale, reason: "reset".into() },
            t0,
        );
        session.handle(SessionEvent::Tick, t0 + Duration::from_secs(1));
        open(&mut session, t0 + Duration::from_secs(1));

        let text = r#"{"type":"chat_message","username":"b","content":"x","timestamp":"2024-05-01T12:00:00Z"}"#;
        let actions =
            session.handle(SessionEvent::FrameReceived { connection_id: stale, text: text.into() }, t0);

        assert!(actions.is_empty());
        assert!(session.timeline().is_empty());
    }

    #[test]
    fn undecodable_frames_are_dropped() {
        let (mut session, t0, _) = start();
        open(&mut session, t0);

        let connection_id = session.connection_id();
        let actions = session
            .handle(SessionEvent::FrameReceived { connection_id, text: "not json".into() }, t0);

        assert!(actions.is_empty());
        assert!(session.last_error().is_none());
    }

    #[test]
    fn history_failure_is_reported_and_retryable() {
        let (mut session, t0, actions) = start();
        let SessionAction::FetchHistory(request) = &actions[1] else {
            unreachable!("expected FetchHistory");
        };

        let actions = session.handle(
            SessionEvent::HistoryFailed { request_id: request.request_id, reason: "503".into() },
            t0,
        );

        assert!(matches!(actions[0], SessionAction::Report(SessionError::History(_))));
        assert!(session.timeline().is_empty());
        assert!(!session.is_loading());

        let actions = session.reload(t0);
        assert!(matches!(actions[0], SessionAction::FetchHistory(HistoryRequest { page: 1, .. })));
    }

    #[test]
    fn close_is_idempotent() {
        let (mut session, t0, _) = start();
        open(&mut session, t0);
        let connection_id = session.connection_id();

        let actions = session.close(t0);
        assert_eq!(actions, vec![
            SessionAction::Disconnect { connection_id },
            SessionAction::Render
        ]);

        assert!(session.close(t0).is_empty());
        assert_eq!(session.connection_state(), ConnectionState::Closed);
    }

    #[test]
    fn closed_session_ignores_everything() {
        let (mut session, t0, actions) = start();
        let SessionAction::FetchHistory(request) = &actions[1] else {
            unreachable!("expected FetchHistory");
        };
        session.close(t0);

        let page = HistoryPage::new(vec![Message::new("b", "x", datetime!(2024-05-01 12:00 UTC))], true);
        let loaded = session.handle(
            SessionEvent::HistoryLoaded { request_id: request.request_id, page },
            t0,
        );

        assert!(loaded.is_empty());
        assert!(session.timeline().is_empty());
        assert!(session.load_older(t0).is_empty());
        assert!(session.reload(t0).is_empty());
        assert!(session.send(MessageDraft::new("alice", "hi"), datetime!(2024-05-01 12:00 UTC)).is_empty());
        assert!(session.handle(SessionEvent::Tick, t0 + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn reconnect_uses_new_credential() {
        let (mut session, t0, _) = start();
        open(&mut session, t0);

        session.set_credential(Credential::new("fresh"));
        let connection_id = session.connection_id();
        session.handle(SessionEvent::TransportClosed { connection_id, reason: "reset".into() }, t0);

        let actions = session.handle(SessionEvent::Tick, t0 + Duration::from_secs(1));
        assert!(actions.iter().any(|a| matches!(
            a,
            SessionAction::Connect { url, .. } if url.query() == Some("access_token=fresh")
        )));
    }

    #[test]
    fn own_messages_are_recognized() {
        let (session, _, _) = start();
        let at = datetime!(2024-05-01 12:00 UTC);

        assert!(session.is_own(&Message::new("alice", "x", at)));
        assert!(!session.is_own(&Message::new("bob", "x", at)));
    }
}
