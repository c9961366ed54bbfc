//! Error types for the wire layer.

use thiserror::Error;

/// Errors decoding, encoding, or addressing protocol data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Live frame is not a valid envelope
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// History response does not match the page schema
    #[error("malformed history page: {0}")]
    MalformedHistory(String),

    /// Envelope kind has no wire representation
    #[error("cannot encode {0} envelope")]
    Unencodable(&'static str),

    /// Backend base URL cannot address the channel endpoints
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}
