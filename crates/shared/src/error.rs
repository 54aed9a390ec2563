//! Errors raised while decoding hub protocol frames.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not valid JSON or misses a required field.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The server refused the handshake.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// A message `type` this client does not understand.
    #[error("unsupported message type {0}")]
    UnsupportedType(u64),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Malformed(err.to_string())
    }
}
