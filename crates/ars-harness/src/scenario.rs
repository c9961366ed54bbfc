//! Full runtime scenarios over the simulated network.
//!
//! A [`Scenario`] runs the real [`Runtime`] with [`SimEnv`], [`SimTransport`],
//! [`SimHistory`] and [`RecordingView`]. Tests script the backend, drive the
//! server side through [`SimPeer`]s, and wait on what the view recorded.
//! Intended for `#[tokio::test(start_paused = true)]`, where waiting costs no
//! wall time.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use ars_client::{Runtime, RuntimeConfig, RuntimeError, RuntimeHandle, Services, TokenSource};
use ars_core::Credential;
use ars_proto::{Endpoints, ProtocolError, TeamId};
use tokio::{task::JoinHandle, time::Instant};

use crate::{
    recording_view::RecordingView,
    sim_env::SimEnv,
    sim_history::SimHistory,
    sim_transport::{ConnectOutcome, SimPeer, SimServer, SimTransport},
};

/// Backend base URL every scenario talks to.
pub const SIM_BACKEND: &str = "http://sim.invalid";

/// Longest a scenario waits for a condition, in simulated time.
const WAIT_LIMIT: Duration = Duration::from_secs(120);

/// Polling interval while waiting.
const POLL: Duration = Duration::from_millis(10);

/// Access token the test can rotate while the runtime runs.
#[derive(Debug, Clone)]
pub struct SimTokens {
    access: Arc<Mutex<String>>,
}

impl SimTokens {
    /// Start with `access`.
    pub fn new(access: impl Into<String>) -> Self {
        Self { access: Arc::new(Mutex::new(access.into())) }
    }

    /// Replace the access token.
    pub fn rotate(&self, access: impl Into<String>) {
        *self.access.lock().unwrap_or_else(PoisonError::into_inner) = access.into();
    }
}

impl TokenSource for SimTokens {
    fn access_token(&self) -> Credential {
        Credential::new(self.access.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// Builder for a [`Scenario`].
#[derive(Debug)]
pub struct ScenarioBuilder {
    team: TeamId,
    username: String,
    config: RuntimeConfig,
    history: SimHistory,
    tokens: SimTokens,
    outcomes: Vec<ConnectOutcome>,
}

impl ScenarioBuilder {
    /// Mount as `username` instead of `alice`.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Serve history from `history`.
    pub fn history(mut self, history: SimHistory) -> Self {
        self.history = history;
        self
    }

    /// Supply access tokens from `tokens`.
    pub fn tokens(mut self, tokens: SimTokens) -> Self {
        self.tokens = tokens;
        self
    }

    /// Script the outcome of the next handshake.
    pub fn connect(mut self, outcome: ConnectOutcome) -> Self {
        self.outcomes.push(outcome);
        self
    }

    /// Spawn the runtime. Must be called inside a tokio runtime.
    pub fn start(self) -> Result<Scenario, ProtocolError> {
        let endpoints = Endpoints::parse(SIM_BACKEND)?;
        let (transport, server) = SimTransport::new();
        for outcome in self.outcomes {
            server.script(outcome);
        }

        let env = SimEnv::new();
        let view = RecordingView::new();
        let services =
            Services { transport, history: self.history.clone(), tokens: self.tokens.clone() };

        let (runtime, handle) =
            Runtime::new(env, services, view.clone(), endpoints, self.username, self.config);
        let task = tokio::spawn(runtime.run(self.team));

        Ok(Scenario { handle, view, server, history: self.history, tokens: self.tokens, env, task })
    }
}

/// A running runtime over the simulated network.
#[derive(Debug)]
pub struct Scenario {
    /// Commands into the runtime
    pub handle: RuntimeHandle,
    /// What the runtime rendered
    pub view: RecordingView,
    /// Server side of the live connection
    pub server: SimServer,
    /// Scripted history backend
    pub history: SimHistory,
    /// Access tokens handed to connection attempts
    pub tokens: SimTokens,
    /// Simulated clock
    pub env: SimEnv,
    task: JoinHandle<Result<(), RuntimeError>>,
}

impl Scenario {
    /// Start building a scenario that mounts `team`.
    pub fn builder(team: &str) -> ScenarioBuilder {
        ScenarioBuilder {
            team: TeamId::new(team),
            username: "alice".to_string(),
            config: RuntimeConfig::default(),
            history: SimHistory::new(),
            tokens: SimTokens::new("sim-token"),
            outcomes: Vec::new(),
        }
    }

    /// Wait until `condition` holds for the view.
    ///
    /// Returns `false` if it still does not hold after two simulated
    /// minutes.
    pub async fn wait_until(&self, mut condition: impl FnMut(&RecordingView) -> bool) -> bool {
        let deadline = Instant::now() + WAIT_LIMIT;
        loop {
            if condition(&self.view) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> Option<SimPeer> {
        tokio::time::timeout(WAIT_LIMIT, self.server.accept()).await.ok().flatten()
    }

    /// Let simulated time pass.
    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Whether the runtime loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Shut the runtime down and wait for it.
    pub async fn stop(self) -> Result<(), RuntimeError> {
        // Already stopped is fine; the join below reports how it ended
        let _ = self.handle.shutdown().await;
        self.task.await.map_err(|_| RuntimeError::Shutdown)?
    }
}
