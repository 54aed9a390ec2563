//! Connection manager: one live hub connection per `(topic, enabled)` pair.
//!
//! All state lives in a single actor task that drains a command queue. Helper
//! tasks (transport start, join, retry timers) only post commands back,
//! tagged with the generation they were started under. The generation moves
//! on every connect and every teardown, so anything a stale connection
//! reports is dropped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use contest_live_shared::Topic;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::connection::{ConnectionState, Connector, EventSink, Transport, TransportEvent};
use super::policy::{Effect, PolicyEvent, ReconnectPolicy};
use super::resolver::{JoinOutcome, JoinTable};
use crate::config::LiveSyncConfig;

/// A push message for the topic that was active when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub topic: Topic,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// What consumers get to see about the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStatus {
    pub state: ConnectionState,
    /// True iff `state` is `Connected`
    pub is_connected: bool,
    pub last_error: Option<String>,
    pub retry_count: u32,
    /// Join method the server accepted on the current link
    pub joined_via: Option<String>,
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            is_connected: false,
            last_error: None,
            retry_count: 0,
            joined_via: None,
        }
    }
}

enum Command {
    Configure {
        topic: Option<Topic>,
        enabled: bool,
    },
    Reconnect,
    Disconnect,
    Shutdown(Option<oneshot::Sender<()>>),
    Started {
        generation: u64,
        transport: Arc<dyn Transport>,
        result: Result<(), String>,
    },
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    Joined {
        generation: u64,
        outcome: JoinOutcome,
    },
    RetryDue {
        generation: u64,
        timer: u64,
    },
}

/// Handle to a running connection manager.
///
/// Dropping the handle stops the manager and closes its connection, the same
/// as unmounting the consumer.
pub struct LiveSync {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<LiveStatus>,
    task: Option<JoinHandle<()>>,
}

impl LiveSync {
    /// Start the manager on the current tokio runtime.
    ///
    /// `on_update` runs inside the manager loop for every leaderboard
    /// broadcast, in arrival order. A panic inside it is logged and ignored.
    pub fn spawn<F>(config: LiveSyncConfig, connector: Arc<dyn Connector>, on_update: F) -> Self
    where
        F: FnMut(LiveUpdate) + Send + 'static,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(LiveStatus::default());

        let actor = Actor {
            resolver: JoinTable::new(config.join_methods.iter().cloned()),
            policy: ReconnectPolicy::new(config.max_retries, config.retry_delay),
            config,
            connector,
            on_update,
            commands: commands.clone(),
            topic: None,
            enabled: false,
            generation: 0,
            current: None,
            retry: None,
            next_timer: 0,
            joined_via: None,
            status: status_tx,
        };

        let task = tokio::spawn(actor.run(rx));

        Self {
            commands,
            status,
            task: Some(task),
        }
    }

    /// Set the topic and whether live sync is wanted.
    ///
    /// Any change tears down the current connection first; a new one opens
    /// when `enabled` is true and the topic is not blank.
    pub fn configure(&self, topic: Option<Topic>, enabled: bool) {
        self.send(Command::Configure { topic, enabled });
    }

    /// Drop the current connection and open a fresh one with a zeroed retry
    /// counter. This is the way out of `Failed`.
    pub fn reconnect(&self) {
        self.send(Command::Reconnect);
    }

    /// Close the connection and stop retrying. Idempotent.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    pub fn status(&self) -> LiveStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<LiveStatus> {
        self.status.clone()
    }

    /// Stop the manager and wait until it has released its connection.
    pub async fn shutdown(mut self) {
        let (ack, done) = oneshot::channel();
        self.send(Command::Shutdown(Some(ack)));
        let _ = done.await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            crate::log_debug!("LiveSync command dropped: manager already stopped");
        }
    }
}

impl Drop for LiveSync {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Shutdown(None));
        }
    }
}

struct Actor<F> {
    config: LiveSyncConfig,
    connector: Arc<dyn Connector>,
    resolver: JoinTable,
    on_update: F,
    /// Loop-back sender handed to helper tasks
    commands: mpsc::UnboundedSender<Command>,
    topic: Option<Topic>,
    enabled: bool,
    generation: u64,
    current: Option<Arc<dyn Transport>>,
    policy: ReconnectPolicy,
    retry: Option<(u64, JoinHandle<()>)>,
    next_timer: u64,
    joined_via: Option<String>,
    status: watch::Sender<LiveStatus>,
}

impl<F> Actor<F>
where
    F: FnMut(LiveUpdate) + Send + 'static,
{
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            if let Command::Shutdown(ack) = command {
                self.apply(PolicyEvent::Disconnect);
                crate::log_debug!("LiveSync manager stopped");
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                return;
            }
            self.handle(command);
        }
    }

    fn should_run(&self) -> bool {
        self.enabled && self.topic.is_some()
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Configure { topic, enabled } => {
                let topic = topic.filter(|t| !t.is_blank());
                if topic == self.topic && enabled == self.enabled {
                    return;
                }

                crate::log_info!("LiveSync configured: topic={:?} enabled={}", topic, enabled);
                self.topic = topic;
                self.enabled = enabled;
                self.apply(PolicyEvent::Disconnect);
                if self.should_run() {
                    self.apply(PolicyEvent::Connect);
                }
            }
            Command::Reconnect => {
                if self.should_run() {
                    self.apply(PolicyEvent::ManualReconnect);
                } else {
                    crate::log_debug!("Reconnect ignored: no enabled topic");
                }
            }
            Command::Disconnect => self.apply(PolicyEvent::Disconnect),
            Command::Shutdown(_) => {}
            Command::Started {
                generation,
                transport,
                result,
            } => {
                if generation != self.generation {
                    if result.is_ok() {
                        crate::log_debug!("Closing connection that opened after it was replaced");
                        tokio::spawn(async move { transport.stop().await });
                    }
                    return;
                }
                match result {
                    Ok(()) if self.policy.state() == &ConnectionState::Connecting => {
                        self.apply(PolicyEvent::Opened)
                    }
                    Ok(()) if self.policy.state().is_connecting() => {
                        crate::log_debug!("Connection already reconnecting when its start completed");
                    }
                    Ok(()) => {
                        crate::log_debug!("Connection closed before its start completed");
                        tokio::spawn(async move { transport.stop().await });
                    }
                    Err(error) => {
                        crate::log_warn!("Leaderboard connection failed to open: {}", error);
                        self.apply(PolicyEvent::OpenFailed(error));
                    }
                }
            }
            Command::Transport { generation, event } => {
                if generation == self.generation {
                    self.on_transport_event(event);
                }
            }
            Command::Joined {
                generation,
                outcome,
            } => {
                if generation == self.generation {
                    self.joined_via = outcome.method().map(str::to_string);
                    self.publish();
                }
            }
            Command::RetryDue { generation, timer } => {
                let armed = matches!(self.retry, Some((id, _)) if id == timer);
                if generation == self.generation && armed {
                    self.retry = None;
                    crate::log_info!(
                        "Retrying leaderboard connection (attempt {})",
                        self.policy.retry_count()
                    );
                    self.apply(PolicyEvent::Connect);
                }
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message { target, payload } => {
                if target == self.config.update_event {
                    self.deliver(payload);
                } else {
                    crate::log_debug!("Ignoring hub broadcast {}", target);
                }
            }
            TransportEvent::Reconnecting(error) => {
                crate::log_warn!("Leaderboard connection reconnecting: {:?}", error);
                self.joined_via = None;
                self.apply(PolicyEvent::Reconnecting(error));
            }
            TransportEvent::Reconnected(connection_id) => {
                crate::log_info!("Leaderboard connection restored ({})", connection_id);
                self.apply(PolicyEvent::Reconnected);
            }
            TransportEvent::Closed(error) => {
                match &error {
                    Some(error) => crate::log_warn!("Leaderboard connection closed: {}", error),
                    None => crate::log_info!("Leaderboard connection closed"),
                }
                self.joined_via = None;
                self.apply(PolicyEvent::Closed(error));
            }
        }
    }

    fn deliver(&mut self, payload: Value) {
        let Some(topic) = self.topic.clone() else {
            return;
        };
        let update = LiveUpdate {
            topic,
            payload,
            received_at: Utc::now(),
        };

        let on_update = &mut self.on_update;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| on_update(update))) {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            crate::log_error!("Leaderboard update handler panicked: {}", reason);
        }
    }

    fn apply(&mut self, event: PolicyEvent) {
        for effect in self.policy.handle(event) {
            match effect {
                Effect::CancelRetry => self.cancel_retry(),
                Effect::ScheduleRetry(delay) => self.schedule_retry(delay),
                Effect::Connect => self.open(),
                Effect::Teardown => self.teardown(),
                Effect::Join => self.join(),
            }
        }
        self.publish();
    }

    fn cancel_retry(&mut self) {
        if let Some((_, timer)) = self.retry.take() {
            timer.abort();
        }
    }

    fn schedule_retry(&mut self, delay: std::time::Duration) {
        self.cancel_retry();
        self.next_timer += 1;
        let timer = self.next_timer;
        let generation = self.generation;
        let commands = self.commands.clone();

        crate::log_info!(
            "Scheduling leaderboard reconnect in {:?} (retry {}/{})",
            delay,
            self.policy.retry_count(),
            self.config.max_retries
        );
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::RetryDue { generation, timer });
        });
        self.retry = Some((timer, handle));
    }

    /// Invalidate everything the current connection may still report and close it.
    fn teardown(&mut self) {
        self.generation += 1;
        self.joined_via = None;
        if let Some(transport) = self.current.take() {
            tokio::spawn(async move { transport.stop().await });
        }
    }

    fn open(&mut self) {
        self.teardown();
        if !self.should_run() {
            return;
        }

        let generation = self.generation;
        let commands = self.commands.clone();
        let events = EventSink::new(move |event| {
            let _ = commands.send(Command::Transport { generation, event });
        });

        let transport = self.connector.open(events);
        self.current = Some(Arc::clone(&transport));

        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = transport.start().await.map_err(|e| e.to_string());
            let _ = commands.send(Command::Started {
                generation,
                transport,
                result,
            });
        });
    }

    fn join(&mut self) {
        let (Some(transport), Some(topic)) = (self.current.clone(), self.topic.clone()) else {
            return;
        };
        let resolver = self.resolver.clone();
        let generation = self.generation;
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let outcome = resolver.join(&*transport, &topic).await;
            let _ = commands.send(Command::Joined {
                generation,
                outcome,
            });
        });
    }

    fn publish(&mut self) {
        let state = self.policy.state().clone();
        let next = LiveStatus {
            is_connected: state.is_connected(),
            state,
            last_error: self.policy.last_error().map(str::to_string),
            retry_count: self.policy.retry_count(),
            joined_via: self.joined_via.clone(),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
