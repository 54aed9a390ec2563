use contest_live_shared::ProtocolError;
use thiserror::Error;

/// Errors produced by the live leaderboard client.
///
/// None of these reach consumers directly; the connection manager turns them
/// into `LiveStatus::last_error` text.
#[derive(Error, Debug)]
pub enum LiveError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Endpoint could not be parsed or joined with the hub path
    #[error("Invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    /// Frame could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Server closed or never completed the handshake
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The server answered an invocation with an error
    #[error("Invocation of {method} rejected: {reason}")]
    InvocationRejected { method: String, reason: String },

    /// The connection went away before the operation finished
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Configuration is unusable
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type LiveResult<T> = Result<T, LiveError>;
