//! Error types for the I/O layer.

use ars_core::RegistryError;
use ars_proto::ProtocolError;
use thiserror::Error;

/// Errors talking to the REST backend.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request could not be sent or the body could not be read
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("unexpected status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Credentials were rejected and could not be refreshed
    #[error("unauthorized")]
    Unauthorized,

    /// Response body did not match the expected schema
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors on the live connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Handshake failed
    #[error("connect failed: {0}")]
    Connect(String),

    /// Established stream failed
    #[error("stream error: {0}")]
    Stream(String),
}

/// Errors from the runtime loop and its handle.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Session could not be mounted
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Runtime has stopped
    #[error("runtime has shut down")]
    Shutdown,
}
