//! Async driver for channel sessions.
//!
//! The runtime owns a [`SessionRegistry`] and is the only place session state
//! is mutated. One `tokio::select!` loop multiplexes three sources:
//!
//! - events reported by spawned tasks (handshakes, socket pumps, history
//!   fetches), each tagged with the [`SessionId`] that started it
//! - user commands from [`RuntimeHandle`]
//! - a tick interval driving timeouts and reconnects
//!
//! Actions returned by the sessions are executed here: `Connect` spawns a
//! link task and records it in the link table, `Disconnect` removes and
//! aborts it, `FetchHistory` spawns a fetch, and view actions go to the
//! [`View`] when they belong to the session on screen.

use std::{collections::HashMap, ops::Sub, sync::Arc, time::Duration};

use ars_core::{
    ChannelSession, ConnectionId, Environment, HistoryRequest, RegistryError, ScrollDirective,
    SessionAction, SessionError, SessionEvent, SessionId, SessionRegistry,
};
use ars_proto::{Endpoints, MessageDraft, TeamId, endpoint};
use tokio::{
    sync::mpsc,
    task::AbortHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    auth::TokenSource,
    config::RuntimeConfig,
    error::RuntimeError,
    history::HistorySource,
    transport::{Inbound, Transport},
};

/// Buffer for user commands.
const COMMAND_CAPACITY: usize = 32;

/// Buffer for frames waiting on a link.
const LINK_CAPACITY: usize = 64;

type Tagged = (SessionId, SessionEvent);

/// User intents for the session on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a message as the current user
    Send(String),
    /// Load the next older history page
    LoadOlder,
    /// Retry the initial history load
    Reload,
    /// Unmount the current team and mount another
    SwitchTeam(TeamId),
    /// Tear everything down and stop the loop
    Shutdown,
}

/// Cloneable handle for sending commands to a running [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
}

impl RuntimeHandle {
    /// Queue a command.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Shutdown` if the runtime has stopped
    pub async fn command(&self, command: Command) -> Result<(), RuntimeError> {
        self.commands.send(command).await.map_err(|_| RuntimeError::Shutdown)
    }

    /// Send a message.
    pub async fn send(&self, content: impl Into<String>) -> Result<(), RuntimeError> {
        self.command(Command::Send(content.into())).await
    }

    /// Load the next older page.
    pub async fn load_older(&self) -> Result<(), RuntimeError> {
        self.command(Command::LoadOlder).await
    }

    /// Retry the initial history load.
    pub async fn reload(&self) -> Result<(), RuntimeError> {
        self.command(Command::Reload).await
    }

    /// Switch to another team.
    pub async fn switch_team(&self, team: TeamId) -> Result<(), RuntimeError> {
        self.command(Command::SwitchTeam(team)).await
    }

    /// Stop the runtime.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.command(Command::Shutdown).await
    }
}

/// Presentation of the session on screen.
pub trait View<I>: Send + 'static
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Session state changed; redraw it.
    fn render(&mut self, session: &ChannelSession<I>);

    /// Adjust the scroll position after the next layout.
    fn scroll(&mut self, directive: ScrollDirective);

    /// Show an error surfaced by the session for `team`.
    fn report(&mut self, team: &TeamId, error: &SessionError);
}

/// External collaborators of a [`Runtime`].
#[derive(Debug)]
pub struct Services<T, H, K> {
    /// Opens live connections
    pub transport: T,
    /// Fetches history pages
    pub history: H,
    /// Supplies access tokens for connection attempts
    pub tokens: K,
}

/// Owned handle to one live connection task.
#[derive(Debug)]
struct Link {
    outgoing: mpsc::Sender<String>,
    abort_handle: AbortHandle,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// Event loop driving channel sessions.
pub struct Runtime<E, T, H, K, V>
where
    E: Environment,
    T: Transport,
    H: HistorySource,
    K: TokenSource,
    V: View<E::Instant>,
{
    env: E,
    transport: Arc<T>,
    history: Arc<H>,
    tokens: K,
    view: V,
    username: String,
    tick_interval: Duration,
    registry: SessionRegistry<E::Instant>,
    current: Option<(SessionId, TeamId)>,
    links: HashMap<(SessionId, ConnectionId), Link>,
    events_tx: mpsc::UnboundedSender<Tagged>,
    events_rx: mpsc::UnboundedReceiver<Tagged>,
    commands: mpsc::Receiver<Command>,
}

impl<E, T, H, K, V> Runtime<E, T, H, K, V>
where
    E: Environment,
    T: Transport,
    H: HistorySource,
    K: TokenSource,
    V: View<E::Instant>,
{
    /// Create a runtime and the handle that controls it.
    pub fn new(
        env: E,
        services: Services<T, H, K>,
        view: V,
        endpoints: Endpoints,
        username: impl Into<String>,
        config: RuntimeConfig,
    ) -> (Self, RuntimeHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);

        let runtime = Self {
            env,
            transport: Arc::new(services.transport),
            history: Arc::new(services.history),
            tokens: services.tokens,
            view,
            username: username.into(),
            tick_interval: config.tick_interval,
            registry: SessionRegistry::new(endpoints, config.session),
            current: None,
            links: HashMap::new(),
            events_tx,
            events_rx,
            commands: commands_rx,
        };

        (runtime, RuntimeHandle { commands: commands_tx })
    }

    /// Mount `team` and run until shutdown.
    ///
    /// Returns when a `Shutdown` command arrives or every handle is dropped.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Registry` if `team` cannot be mounted
    pub async fn run(mut self, team: TeamId) -> Result<(), RuntimeError> {
        self.mount(team)?;

        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    if let Some((id, event)) = event {
                        let actions = self.registry.dispatch(id, event, self.env.now());
                        self.execute(id, actions);
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.command(command),
                },
                _ = ticker.tick() => self.tick(),
            }
        }

        self.shutdown();
        Ok(())
    }

    fn mount(&mut self, team: TeamId) -> Result<(), RegistryError> {
        let credential = self.tokens.access_token();
        let (id, actions) =
            self.registry.mount(team.clone(), self.username.clone(), credential, self.env.now())?;

        info!(%team, session = %id, "mounted team");
        self.current = Some((id, team));
        self.execute(id, actions);
        self.render(id);
        Ok(())
    }

    fn command(&mut self, command: Command) {
        let now = self.env.now();
        let Some((id, team)) = self.current.clone() else {
            warn!(?command, "no session mounted");
            return;
        };

        let actions = match command {
            Command::Send(content) => {
                let draft = MessageDraft::new(self.username.clone(), content);
                let sent_at = self.env.wall_clock();
                self.registry.session_mut(id).map(|s| s.send(draft, sent_at))
            },
            Command::LoadOlder => self.registry.session_mut(id).map(|s| s.load_older(now)),
            Command::Reload => self.registry.session_mut(id).map(|s| s.reload(now)),
            Command::SwitchTeam(to) => {
                self.switch(&team, to);
                return;
            },
            Command::Shutdown => return,
        };

        if let Some(actions) = actions {
            self.execute(id, actions);
        }
    }

    fn switch(&mut self, from: &TeamId, to: TeamId) {
        let credential = self.tokens.access_token();
        let result = self.registry.switch(
            from,
            to.clone(),
            self.username.clone(),
            credential,
            self.env.now(),
        );

        match result {
            Ok((id, actions)) => {
                info!(%from, %to, session = %id, "switched team");
                self.current = Some((id, to));
                for (owner, action) in actions {
                    self.execute(owner, vec![action]);
                }
                self.render(id);
            },
            Err(RegistryError::Session(err)) => {
                warn!(%to, %err, "cannot mount team");
                self.view.report(&to, &err);
            },
            Err(err) => warn!(%to, %err, "cannot switch team"),
        }
    }

    fn tick(&mut self) {
        // Reconnect attempts opened by this tick must use the freshest token
        self.registry.set_credential(&self.tokens.access_token());

        for (id, action) in self.registry.tick(self.env.now()) {
            self.execute(id, vec![action]);
        }
    }

    fn shutdown(&mut self) {
        if let Some((id, team)) = self.current.take()
            && let Some((_, actions)) = self.registry.unmount(&team, self.env.now())
        {
            self.execute(id, actions);
        }

        self.links.clear();
        info!("runtime stopped");
    }

    fn execute(&mut self, id: SessionId, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Connect { connection_id, url } => self.connect(id, connection_id, url),
                SessionAction::Disconnect { connection_id } => {
                    if self.links.remove(&(id, connection_id)).is_some() {
                        debug!(session = %id, connection = %connection_id, "link dropped");
                    }
                },
                SessionAction::SendFrame { connection_id, text } => {
                    self.send_frame(id, connection_id, text);
                },
                SessionAction::FetchHistory(request) => self.fetch(id, request),
                SessionAction::Scroll(directive) => {
                    if self.is_current(id) {
                        self.view.scroll(directive);
                    }
                },
                SessionAction::Render => self.render(id),
                SessionAction::Report(err) => {
                    warn!(session = %id, %err, "session error");
                    if let Some((current, team)) = &self.current
                        && *current == id
                    {
                        self.view.report(team, &err);
                    }
                },
            }
        }
    }

    fn render(&mut self, id: SessionId) {
        if !self.is_current(id) {
            return;
        }
        if let Some(session) = self.registry.session(id) {
            self.view.render(session);
        }
    }

    fn is_current(&self, id: SessionId) -> bool {
        self.current.as_ref().is_some_and(|(current, _)| *current == id)
    }

    fn connect(&mut self, id: SessionId, connection_id: ConnectionId, url: Url) {
        info!(session = %id, connection = %connection_id, url = %endpoint::redact(&url), "connecting");

        let (outgoing_tx, outgoing_rx) = mpsc::channel(LINK_CAPACITY);
        let task = tokio::spawn(run_link(
            Arc::clone(&self.transport),
            url,
            (id, connection_id),
            outgoing_rx,
            self.events_tx.clone(),
        ));

        let link = Link { outgoing: outgoing_tx, abort_handle: task.abort_handle() };
        self.links.insert((id, connection_id), link);
    }

    fn send_frame(&mut self, id: SessionId, connection_id: ConnectionId, text: String) {
        let Some(link) = self.links.get(&(id, connection_id)) else {
            warn!(session = %id, connection = %connection_id, "no link for frame");
            return;
        };

        if let Err(err) = link.outgoing.try_send(text) {
            warn!(session = %id, connection = %connection_id, %err, "dropping outgoing frame");
        }
    }

    fn fetch(&self, id: SessionId, request: HistoryRequest) {
        let history = Arc::clone(&self.history);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let request_id = request.request_id;
            let event = match history.fetch(&request.team_id, request.page).await {
                Ok(page) => SessionEvent::HistoryLoaded { request_id, page },
                Err(err) => SessionEvent::HistoryFailed { request_id, reason: err.to_string() },
            };

            if events.send((id, event)).is_err() {
                debug!(session = %id, "runtime gone, dropping history result");
            }
        });
    }
}

enum LinkStep {
    Outgoing(Option<String>),
    Incoming(Option<Inbound>),
}

/// Handshake and pump one connection, reporting into `events`.
async fn run_link<T: Transport>(
    transport: Arc<T>,
    url: Url,
    (session, connection_id): (SessionId, ConnectionId),
    mut outgoing: mpsc::Receiver<String>,
    events: mpsc::UnboundedSender<Tagged>,
) {
    let report = |event: SessionEvent| events.send((session, event)).is_ok();

    let mut connected = match transport.connect(url).await {
        Ok(connected) => connected,
        Err(err) => {
            report(SessionEvent::TransportClosed { connection_id, reason: err.to_string() });
            return;
        },
    };

    if !report(SessionEvent::TransportOpened { connection_id }) {
        return;
    }

    let reason = loop {
        let step = tokio::select! {
            frame = outgoing.recv() => LinkStep::Outgoing(frame),
            inbound = connected.incoming.recv() => LinkStep::Incoming(inbound),
        };

        match step {
            LinkStep::Outgoing(Some(text)) => {
                if connected.outgoing.send(text).await.is_err() {
                    break "connection task stopped".to_string();
                }
            },
            // Link dropped by the runtime
            LinkStep::Outgoing(None) => return,
            LinkStep::Incoming(Some(Inbound::Frame(text))) => {
                if !report(SessionEvent::FrameReceived { connection_id, text }) {
                    return;
                }
            },
            LinkStep::Incoming(Some(Inbound::Closed { reason })) => break reason,
            LinkStep::Incoming(None) => break "connection task stopped".to_string(),
        }
    };

    report(SessionEvent::TransportClosed { connection_id, reason });
}
