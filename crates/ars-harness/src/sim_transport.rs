//! In-memory transport with a scripted server side.
//!
//! [`SimTransport`] goes into the runtime; the paired [`SimServer`] stays with
//! the test. Every handshake consumes the next scripted [`ConnectOutcome`]
//! (accepting when the script is empty). Accepted connections surface as
//! [`SimPeer`]s, which push frames to the client and read what it sent.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use ars_client::{Connected, Inbound, Transport, TransportError};
use ars_proto::{Envelope, Message};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

/// Buffer for frames in each direction.
const PEER_CAPACITY: usize = 64;

/// How the next handshake ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Handshake succeeds
    Accept,
    /// Handshake fails immediately with this reason
    Refuse(String),
    /// Handshake never completes
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    outcomes: VecDeque<ConnectOutcome>,
    attempts: Vec<Url>,
}

/// Client half of the simulated network.
#[derive(Debug, Clone)]
pub struct SimTransport {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedSender<SimPeer>,
}

/// Test half of the simulated network.
#[derive(Debug)]
pub struct SimServer {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedReceiver<SimPeer>,
}

impl SimTransport {
    /// Create a connected transport/server pair.
    pub fn new() -> (Self, SimServer) {
        let script = Arc::new(Mutex::new(Script::default()));
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();

        let transport = Self { script: Arc::clone(&script), peers: peers_tx };
        let server = SimServer { script, peers: peers_rx };
        (transport, server)
    }
}

impl Transport for SimTransport {
    async fn connect(&self, url: Url) -> Result<Connected, TransportError> {
        let outcome = {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            script.attempts.push(url.clone());
            script.outcomes.pop_front().unwrap_or(ConnectOutcome::Accept)
        };

        debug!(path = url.path(), ?outcome, "sim handshake");

        match outcome {
            ConnectOutcome::Accept => {
                let (outgoing_tx, outgoing_rx) = mpsc::channel(PEER_CAPACITY);
                let (incoming_tx, incoming_rx) = mpsc::channel(PEER_CAPACITY);

                let peer = SimPeer { url, sent: outgoing_rx, inbound: incoming_tx };
                self.peers
                    .send(peer)
                    .map_err(|_| TransportError::Connect("sim server dropped".to_string()))?;

                Ok(Connected::new(outgoing_tx, incoming_rx, None))
            },
            ConnectOutcome::Refuse(reason) => Err(TransportError::Connect(reason)),
            ConnectOutcome::Hang => std::future::pending().await,
        }
    }
}

impl SimServer {
    /// Queue the outcome of a future handshake.
    pub fn script(&self, outcome: ConnectOutcome) {
        self.lock().outcomes.push_back(outcome);
    }

    /// URLs of every handshake attempted so far, oldest first.
    pub fn attempts(&self) -> Vec<Url> {
        self.lock().attempts.clone()
    }

    /// Wait for the next accepted connection.
    ///
    /// Returns `None` once the transport is gone.
    pub async fn accept(&mut self) -> Option<SimPeer> {
        self.peers.recv().await
    }

    /// Next accepted connection, if one is already waiting.
    pub fn try_accept(&mut self) -> Option<SimPeer> {
        self.peers.try_recv().ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Server end of one accepted connection.
#[derive(Debug)]
pub struct SimPeer {
    url: Url,
    sent: mpsc::Receiver<String>,
    inbound: mpsc::Sender<Inbound>,
}

impl SimPeer {
    /// URL the client connected to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Push a raw text frame. Returns `false` if the client end is gone.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.inbound.try_send(Inbound::Frame(text.into())).is_ok()
    }

    /// Push a chat message envelope.
    pub fn push_message(&self, message: &Message) -> bool {
        match Envelope::from(message.clone()).encode() {
            Ok(text) => self.push(text),
            Err(_) => false,
        }
    }

    /// Close the connection from the server side.
    pub fn close(self, reason: impl Into<String>) {
        let _ = self.inbound.try_send(Inbound::Closed { reason: reason.into() });
    }

    /// Next frame the client sent, waiting if none is queued.
    ///
    /// Returns `None` once the client end is gone.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Whether the client still holds its end of the connection.
    pub fn is_connected(&self) -> bool {
        !self.inbound.is_closed()
    }
}
