//! Live connection transport.
//!
//! A [`Transport`] performs the handshake and hands back a [`Connected`]
//! handle: a channel of outgoing text frames and a channel of [`Inbound`]
//! events. An internal task bridges the channels and the socket. Protocol
//! logic stays in the Sans-IO session; this layer only moves text.

use std::future::Future;

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc, task::AbortHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};
use tracing::{debug, trace};
use url::Url;

use crate::error::TransportError;

/// Buffer for frames in each direction.
const CHANNEL_CAPACITY: usize = 64;

/// Event from an established connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Text frame from the server
    Frame(String),
    /// Connection ended; nothing follows
    Closed {
        /// Close reason or error description
        reason: String,
    },
}

/// Handle to an established connection.
///
/// Dropping the handle stops the connection task.
#[derive(Debug)]
pub struct Connected {
    /// Send text frames to the server.
    pub outgoing: mpsc::Sender<String>,
    /// Receive events from the server.
    pub incoming: mpsc::Receiver<Inbound>,
    abort_handle: Option<AbortHandle>,
}

impl Connected {
    /// Wrap channels bridged by a task that `abort_handle` stops, if any.
    pub fn new(
        outgoing: mpsc::Sender<String>,
        incoming: mpsc::Receiver<Inbound>,
        abort_handle: Option<AbortHandle>,
    ) -> Self {
        Self { outgoing, incoming, abort_handle }
    }

    /// Stop the connection.
    pub fn stop(&self) {
        if let Some(handle) = &self.abort_handle {
            handle.abort();
        }
    }
}

impl Drop for Connected {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Something that can open live connections.
pub trait Transport: Send + Sync + 'static {
    /// Perform the handshake with `url`.
    fn connect(&self, url: Url) -> impl Future<Output = Result<Connected, TransportError>> + Send;
}

/// WebSocket transport over tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    async fn connect(&self, url: Url) -> Result<Connected, TransportError> {
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(status = %response.status(), "websocket handshake complete");

        let (to_server_tx, to_server_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (from_server_tx, from_server_rx) = mpsc::channel::<Inbound>(CHANNEL_CAPACITY);

        let handle = tokio::spawn(run_socket(stream, to_server_rx, from_server_tx));

        Ok(Connected::new(to_server_tx, from_server_rx, Some(handle.abort_handle())))
    }
}

/// Bridge the channels and the socket until either side ends.
async fn run_socket(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut to_server: mpsc::Receiver<String>,
    from_server: mpsc::Sender<Inbound>,
) {
    let (mut sink, mut source) = stream.split();

    let reason = loop {
        tokio::select! {
            frame = to_server.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break TransportError::Stream(e.to_string()).to_string();
                    }
                },
                None => {
                    // Handle dropped: close gracefully
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                },
            },
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if from_server.send(Inbound::Frame(text)).await.is_err() {
                        return;
                    }
                },
                Some(Ok(Message::Close(frame))) => break close_reason(frame.as_ref()),
                Some(Ok(other)) => trace!(?other, "ignoring non-text message"),
                Some(Err(e)) => break TransportError::Stream(e.to_string()).to_string(),
                None => break "stream ended".to_string(),
            },
        }
    };

    debug!(%reason, "websocket closed");
    let _ = from_server.send(Inbound::Closed { reason }).await;
}

fn close_reason(frame: Option<&CloseFrame<'_>>) -> String {
    match frame {
        Some(frame) if !frame.reason.is_empty() => format!("{} ({})", frame.reason, frame.code),
        Some(frame) => format!("closed by server ({})", frame.code),
        None => "closed by server".to_string(),
    }
}
