//! Live channel sessions, at most one per team.
//!
//! Every mount gets a fresh [`SessionId`]. Drivers tag asynchronous work
//! (handshakes, socket pumps, history fetches) with the id of the session
//! that started it and route results back through [`SessionRegistry::dispatch`].
//! Results for an id that is no longer mounted are discarded, so a fetch
//! started by a previous team can never land in the current one.

use std::{
    collections::HashMap,
    fmt,
    ops::Sub,
    time::{Duration, Instant},
};

use ars_proto::{Endpoints, TeamId};
use tracing::debug;

use crate::{
    error::RegistryError,
    session::{ChannelSession, Credential, SessionAction, SessionConfig, SessionEvent},
};

/// Identifier of one mounted session, never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw session number.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw session number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug)]
struct Mounted<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    id: SessionId,
    session: ChannelSession<I>,
}

/// Registry of mounted sessions keyed by team.
#[derive(Debug)]
pub struct SessionRegistry<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    endpoints: Endpoints,
    config: SessionConfig,
    sessions: HashMap<TeamId, Mounted<I>>,
    next_id: u64,
}

impl<I> SessionRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an empty registry. Every session shares `endpoints` and
    /// `config`.
    pub fn new(endpoints: Endpoints, config: SessionConfig) -> Self {
        Self { endpoints, config, sessions: HashMap::new(), next_id: 0 }
    }

    /// Number of mounted sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether `team` has a mounted session.
    pub fn is_mounted(&self, team: &TeamId) -> bool {
        self.sessions.contains_key(team)
    }

    /// Session id of the mounted session for `team`.
    pub fn id_of(&self, team: &TeamId) -> Option<SessionId> {
        self.sessions.get(team).map(|m| m.id)
    }

    /// Mounted session for `team`.
    pub fn get(&self, team: &TeamId) -> Option<&ChannelSession<I>> {
        self.sessions.get(team).map(|m| &m.session)
    }

    /// Mounted session with this id.
    pub fn session(&self, id: SessionId) -> Option<&ChannelSession<I>> {
        self.sessions.values().find(|m| m.id == id).map(|m| &m.session)
    }

    /// Every mounted session, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &ChannelSession<I>)> {
        self.sessions.values().map(|m| (m.id, &m.session))
    }

    /// Mounted session with this id, for user intents.
    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut ChannelSession<I>> {
        self.sessions.values_mut().find(|m| m.id == id).map(|m| &mut m.session)
    }

    /// Mount a session for `team`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlreadyActive` if `team` is already mounted
    /// - `RegistryError::Session` if the session cannot start
    pub fn mount(
        &mut self,
        team: TeamId,
        username: impl Into<String>,
        credential: Credential,
        now: I,
    ) -> Result<(SessionId, Vec<SessionAction>), RegistryError> {
        if self.sessions.contains_key(&team) {
            return Err(RegistryError::AlreadyActive { team_id: team });
        }

        let (session, actions) = ChannelSession::start(
            team.clone(),
            username,
            credential,
            self.endpoints.clone(),
            self.config.clone(),
            now,
        )?;

        self.next_id += 1;
        let id = SessionId::new(self.next_id);
        debug!(%team, session = %id, "mounted");

        self.sessions.insert(team, Mounted { id, session });
        Ok((id, actions))
    }

    /// Unmount `team`, closing its session.
    ///
    /// Returns the session id and its teardown actions, or `None` if `team`
    /// was not mounted.
    pub fn unmount(&mut self, team: &TeamId, now: I) -> Option<(SessionId, Vec<SessionAction>)> {
        let mut mounted = self.sessions.remove(team)?;
        debug!(%team, session = %mounted.id, "unmounted");

        Some((mounted.id, mounted.session.close(now)))
    }

    /// Move the view from `from` to `to`.
    ///
    /// Unmounts `from` (if mounted) and mounts `to`. Returned actions are
    /// tagged with the session they belong to, teardown first.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlreadyActive` if `to` is mounted and is not `from`;
    ///   nothing is unmounted in that case
    pub fn switch(
        &mut self,
        from: &TeamId,
        to: TeamId,
        username: impl Into<String>,
        credential: Credential,
        now: I,
    ) -> Result<(SessionId, Vec<(SessionId, SessionAction)>), RegistryError> {
        if &to != from && self.sessions.contains_key(&to) {
            return Err(RegistryError::AlreadyActive { team_id: to });
        }

        let mut actions = Vec::new();
        if let Some((old, teardown)) = self.unmount(from, now) {
            actions.extend(teardown.into_iter().map(|a| (old, a)));
        }

        let (id, mounted) = self.mount(to, username, credential, now)?;
        actions.extend(mounted.into_iter().map(|a| (id, a)));
        Ok((id, actions))
    }

    /// Route a driver event to session `id`.
    ///
    /// Events for sessions that are no longer mounted are discarded.
    pub fn dispatch(&mut self, id: SessionId, event: SessionEvent, now: I) -> Vec<SessionAction> {
        match self.session_mut(id) {
            Some(session) => session.handle(event, now),
            None => {
                debug!(session = %id, ?event, "discarding event for unmounted session");
                Vec::new()
            },
        }
    }

    /// Tick every mounted session.
    pub fn tick(&mut self, now: I) -> Vec<(SessionId, SessionAction)> {
        let mut actions = Vec::new();
        for mounted in self.sessions.values_mut() {
            let id = mounted.id;
            actions.extend(mounted.session.handle(SessionEvent::Tick, now).into_iter().map(|a| (id, a)));
        }
        actions
    }

    /// Update the credential of every mounted session.
    pub fn set_credential(&mut self, credential: &Credential) {
        for mounted in self.sessions.values_mut() {
            mounted.session.set_credential(credential.clone());
        }
    }
}
