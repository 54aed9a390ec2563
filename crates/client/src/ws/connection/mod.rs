//! Transport connection: state, backoff configuration and the trait seams the
//! connection manager drives.
//!
//! The concrete websocket implementation lives in [`hub`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LiveResult;

mod hub;

pub use hub::{HubConnection, HubConnector};

/// Connection state as seen by consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }
}

/// Configuration for the transport's own auto-reconnect behaviour
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 2000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(u64::from(self.delay_for_attempt(attempt)))
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.initial_delay_ms == 0 {
            return Err("Initial reconnect delay must be > 0".to_string());
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err("Max reconnect delay must be >= initial reconnect delay".to_string());
        }
        if self.backoff_multiplier < 1.0 || !self.backoff_multiplier.is_finite() {
            return Err("Backoff multiplier must be >= 1.0".to_string());
        }
        Ok(())
    }
}

/// Lifecycle and message events reported by a transport.
///
/// A successful [`Transport::start`] is the "opened" signal; everything after
/// that arrives here.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The link dropped and the transport is retrying on its own.
    Reconnecting(Option<String>),
    /// The transport re-established the link under a new connection id.
    Reconnected(String),
    /// Terminal close. `None` means intentional.
    Closed(Option<String>),
    /// A server broadcast.
    Message { target: String, payload: Value },
}

/// Where a transport reports its events.
#[derive(Clone)]
pub struct EventSink {
    emit: Arc<dyn Fn(TransportEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new(emit: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
        }
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.emit)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Calls a server-side hub method and waits for its completion.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> LiveResult<Value>;
}

/// One bidirectional streaming connection.
#[async_trait]
pub trait Transport: Invoker {
    /// Open the connection. Resolves once the link is usable.
    async fn start(&self) -> LiveResult<()>;

    /// Close the connection. Idempotent; safe on a handle that never started.
    async fn stop(&self);
}

/// Creates transports bound to one endpoint.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, events: EventSink) -> Arc<dyn Transport>;
}
