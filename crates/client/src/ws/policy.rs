//! Reconnection policy as an explicit state machine.
//!
//! ```text
//! Disconnected ──Connect──▶ Connecting ──Opened──▶ Connected
//!                              │                     │  ▲
//!                        OpenFailed(e)    Reconnecting│  │Reconnected
//!                              │                     ▼  │
//!                              │                  Reconnecting
//!                              ▼                     │
//!         Disconnected(error) ◀──────Closed(Some(e))─┘
//!              │  retry_count < max: ScheduleRetry ──▶ Connect
//!              └─ otherwise ──▶ Failed
//! ```
//!
//! The policy only decides. The connection manager carries out the returned
//! [`Effect`]s.

use std::time::Duration;

use super::connection::ConnectionState;

/// `last_error` once the retry cap is exhausted.
pub const RETRY_EXHAUSTED: &str = "Failed to reconnect after multiple attempts";

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyEvent {
    /// Open a connection for the current topic.
    Connect,
    /// The transport finished starting.
    Opened,
    /// The transport could not start.
    OpenFailed(String),
    /// The transport lost its link and is retrying on its own.
    Reconnecting(Option<String>),
    /// The transport re-established its link.
    Reconnected,
    /// Terminal close. `None` means intentional.
    Closed(Option<String>),
    /// Consumer asked for a fresh connection.
    ManualReconnect,
    /// Consumer or lifecycle asked to stop.
    Disconnect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Abort the pending retry timer, if any.
    CancelRetry,
    /// Arm a single retry timer.
    ScheduleRetry(Duration),
    /// Open a new transport (tearing down the previous one).
    Connect,
    /// Close the current transport.
    Teardown,
    /// Run the subscription resolver for the current topic.
    Join,
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    state: ConnectionState,
    retry_count: u32,
    max_retries: u32,
    retry_delay: Duration,
    last_error: Option<String>,
}

impl ReconnectPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_count: 0,
            max_retries,
            retry_delay,
            last_error: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Apply one event and return what the manager must do, in order.
    pub fn handle(&mut self, event: PolicyEvent) -> Vec<Effect> {
        match event {
            PolicyEvent::Connect => {
                self.state = ConnectionState::Connecting;
                vec![Effect::CancelRetry, Effect::Connect]
            }
            // Start completed after the transport already reported a close or
            // a reconnect
            PolicyEvent::Opened | PolicyEvent::OpenFailed(_)
                if self.state != ConnectionState::Connecting =>
            {
                vec![]
            }
            PolicyEvent::Opened | PolicyEvent::Reconnected => {
                self.retry_count = 0;
                self.last_error = None;
                self.state = ConnectionState::Connected;
                vec![Effect::CancelRetry, Effect::Join]
            }
            PolicyEvent::OpenFailed(error) | PolicyEvent::Closed(Some(error)) => {
                self.on_error_close(error)
            }
            PolicyEvent::Closed(None) => {
                self.state = ConnectionState::Disconnected;
                vec![Effect::CancelRetry]
            }
            PolicyEvent::Reconnecting(error) => {
                if error.is_some() {
                    self.last_error = error;
                }
                self.state = ConnectionState::Reconnecting;
                vec![Effect::CancelRetry]
            }
            PolicyEvent::ManualReconnect => {
                self.retry_count = 0;
                self.last_error = None;
                self.state = ConnectionState::Connecting;
                vec![Effect::CancelRetry, Effect::Connect]
            }
            PolicyEvent::Disconnect => {
                self.retry_count = 0;
                self.last_error = None;
                self.state = ConnectionState::Disconnected;
                vec![Effect::CancelRetry, Effect::Teardown]
            }
        }
    }

    fn on_error_close(&mut self, error: String) -> Vec<Effect> {
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.last_error = Some(error);
            self.state = ConnectionState::Disconnected;
            vec![Effect::CancelRetry, Effect::ScheduleRetry(self.retry_delay)]
        } else {
            self.last_error = Some(RETRY_EXHAUSTED.to_string());
            self.state = ConnectionState::Failed {
                reason: RETRY_EXHAUSTED.to_string(),
            };
            vec![Effect::CancelRetry]
        }
    }
}
