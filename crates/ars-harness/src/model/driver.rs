//! Applies [`Operation`]s to a real [`ChannelSession`] alongside a reference
//! model of what its timeline should contain.
//!
//! The model is a set of message keys. A live message joins it when the
//! session was open to receive it; an initial page replaces everything but
//! those live messages; an older page is added to it. Everything else (stale frames, garbage, superseded
//! responses, events after teardown) must leave it untouched.

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use ars_core::{
    ChannelSession, ConnectionId, ConnectionState, Credential, FetchKind, HistoryRequest,
    SessionAction, SessionConfig, SessionError, SessionEvent,
};
use ars_proto::{Endpoints, Envelope, HistoryPage, Message, MessageDraft, MessageKey, TeamId};
use time::OffsetDateTime;

use super::operation::{MODEL_EPOCH, Operation};
use crate::invariants::{SessionSnapshot, SystemSnapshot};

/// Team every model channel is mounted for.
pub const MODEL_TEAM: &str = "model-team";

/// A mounted channel under test plus its reference model.
#[derive(Debug)]
pub struct ChannelDriver {
    session: ChannelSession,
    now: Instant,
    wall: OffsetDateTime,
    expected: HashSet<MessageKey>,
    live: HashSet<MessageKey>,
    in_flight: Option<HistoryRequest>,
    stale: Vec<HistoryRequest>,
    connection_history: Vec<u64>,
    sent: Vec<String>,
}

impl ChannelDriver {
    /// Mount a channel for [`MODEL_TEAM`] as `username`.
    pub fn mount(username: &str, config: SessionConfig) -> Result<Self, SessionError> {
        #[allow(clippy::disallowed_methods)]
        let now = Instant::now();
        let endpoints = Endpoints::parse("http://model.invalid")?;

        let (session, actions) = ChannelSession::start(
            TeamId::new(MODEL_TEAM),
            username,
            Credential::new("model-token"),
            endpoints,
            config,
            now,
        )?;

        let mut driver = Self {
            session,
            now,
            wall: MODEL_EPOCH,
            expected: HashSet::new(),
            live: HashSet::new(),
            in_flight: None,
            stale: Vec::new(),
            connection_history: Vec::new(),
            sent: Vec::new(),
        };
        driver.track(actions);
        driver.record_connection();
        Ok(driver)
    }

    /// Session under test.
    pub fn session(&self) -> &ChannelSession {
        &self.session
    }

    /// Frames the session asked to send, oldest first.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Whether the timeline holds exactly the messages the model expects,
    /// each once.
    pub fn matches_model(&self) -> bool {
        let timeline = self.session.timeline();
        let keys: HashSet<_> = timeline.iter().map(Message::key).collect();
        keys == self.expected && timeline.len() == self.expected.len()
    }

    /// Observable state for invariant checks.
    pub fn snapshot(&self) -> SystemSnapshot {
        let mut snapshot = SystemSnapshot::single(SessionSnapshot::from_session(1, &self.session));
        if self.session.is_closed() {
            snapshot.current = None;
        }
        for id in &self.connection_history {
            snapshot.record_connection(TeamId::new(MODEL_TEAM), *id);
        }
        snapshot
    }

    /// Apply one operation.
    pub fn apply(&mut self, op: &Operation) {
        let mounted = !self.session.is_closed();

        match op {
            Operation::HandshakeOk => {
                let connection_id = self.session.connection_id();
                self.handle(SessionEvent::TransportOpened { connection_id });
            },
            Operation::TransportDrop => {
                let connection_id = self.session.connection_id();
                self.handle(SessionEvent::TransportClosed {
                    connection_id,
                    reason: "dropped".to_string(),
                });
            },
            Operation::Live { message } => {
                let message = message.to_message();
                let open = mounted && self.session.connection_state() == ConnectionState::Open;
                if let Ok(text) = Envelope::from(message.clone()).encode() {
                    let connection_id = self.session.connection_id();
                    self.handle(SessionEvent::FrameReceived { connection_id, text });
                    if open && self.expected.insert(message.key()) {
                        self.live.insert(message.key());
                    }
                }
            },
            Operation::StaleFrame { message } => {
                let current = self.session.connection_id().get();
                let stale = if current > 1 { current - 1 } else { current + 1 };
                if let Ok(text) = Envelope::from(message.to_message()).encode() {
                    let connection_id = ConnectionId::new(stale);
                    self.handle(SessionEvent::FrameReceived { connection_id, text });
                }
            },
            Operation::Garbage { bytes } => {
                // A leading control character keeps this from ever parsing as JSON
                let text = format!("\u{1}{}", String::from_utf8_lossy(bytes));
                let connection_id = self.session.connection_id();
                self.handle(SessionEvent::FrameReceived { connection_id, text });
            },
            Operation::LoadOlder => {
                let actions = self.session.load_older(self.now);
                self.track(actions);
            },
            Operation::Reload => {
                let actions = self.session.reload(self.now);
                self.track(actions);
            },
            Operation::DeliverHistory { page } => {
                if let Some(request) = self.in_flight.take() {
                    let messages = page.to_messages();
                    let keys = messages.iter().map(Message::key);
                    match request.kind {
                        FetchKind::Initial => {
                            self.expected = keys.chain(self.live.iter().cloned()).collect();
                        },
                        FetchKind::Older => self.expected.extend(keys),
                    }

                    let page = HistoryPage::new(messages, page.has_next);
                    self.handle(SessionEvent::HistoryLoaded { request_id: request.request_id, page });
                    self.stale.push(request);
                }
            },
            Operation::DeliverStale { page } => {
                if let Some(request) = self.stale.pop() {
                    let page = HistoryPage::new(page.to_messages(), page.has_next);
                    self.handle(SessionEvent::HistoryLoaded { request_id: request.request_id, page });
                    self.stale.push(request);
                }
            },
            Operation::FailHistory => {
                if let Some(request) = self.in_flight.take() {
                    self.handle(SessionEvent::HistoryFailed {
                        request_id: request.request_id,
                        reason: "backend unavailable".to_string(),
                    });
                    self.stale.push(request);
                }
            },
            Operation::Send { seed } => {
                let draft = MessageDraft::new(self.session.username(), format!("sent {seed}"));
                let actions = self.session.send(draft, self.wall);
                self.track(actions);
            },
            Operation::AdvanceTime { millis } => {
                let step = Duration::from_millis(u64::from(*millis));
                self.now += step;
                self.wall += step;
                self.handle(SessionEvent::Tick);
            },
            Operation::Teardown => {
                let actions = self.session.close(self.now);
                self.track(actions);
            },
        }

        // Timeouts, teardown and completions all end the fetch we were tracking
        if !self.session.is_loading()
            && let Some(request) = self.in_flight.take()
        {
            self.stale.push(request);
        }
        self.record_connection();
    }

    fn handle(&mut self, event: SessionEvent) {
        let actions = self.session.handle(event, self.now);
        self.track(actions);
    }

    fn track(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::FetchHistory(request) => {
                    if let Some(superseded) = self.in_flight.replace(request) {
                        self.stale.push(superseded);
                    }
                },
                SessionAction::SendFrame { text, .. } => self.sent.push(text),
                _ => {},
            }
        }
    }

    fn record_connection(&mut self) {
        self.connection_history.push(self.session.connection_id().get());
    }
}
