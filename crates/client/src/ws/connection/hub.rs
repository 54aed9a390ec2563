//! Websocket transport speaking the JSON hub protocol, using tokio-tungstenite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use contest_live_shared::{handshake_request, parse_handshake_response, split_frames, HubMessage};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{Connector, EventSink, Invoker, ReconnectConfig, Transport, TransportEvent};
use crate::auth::TokenProvider;
use crate::config::LiveSyncConfig;
use crate::error::{LiveError, LiveResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long the server gets to answer the handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Interval between client pings while the socket is idle.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

type Completion = oneshot::Sender<Result<Value, String>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves once `stop()` has been called (or the stop signal is gone).
async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

/// Opens [`HubConnection`]s to the configured leaderboard hub.
#[derive(Clone)]
pub struct HubConnector {
    url: Url,
    reconnect: ReconnectConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl HubConnector {
    pub fn new(config: &LiveSyncConfig, tokens: Arc<dyn TokenProvider>) -> LiveResult<Self> {
        Ok(Self {
            url: config.hub_url()?,
            reconnect: config.transport.clone(),
            tokens,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Connector for HubConnector {
    fn open(&self, events: EventSink) -> Arc<dyn Transport> {
        Arc::new(HubConnection::new(
            self.url.clone(),
            self.reconnect.clone(),
            Arc::clone(&self.tokens),
            events,
        ))
    }
}

/// How one physical socket ended.
enum Drive {
    /// `stop()` was called.
    Stopped,
    /// Server-initiated close that must not be retried by the transport.
    Closed(Option<String>),
    /// The link dropped; the transport retries on its own.
    Lost(String),
}

struct Inner {
    url: Url,
    reconnect: ReconnectConfig,
    tokens: Arc<dyn TokenProvider>,
    events: EventSink,
    /// Outbound frames, drained by the socket loop
    outbound: UnboundedSender<String>,
    outbound_rx: Mutex<Option<UnboundedReceiver<String>>>,
    /// Invocations waiting for their completion, by invocation id
    pending: Mutex<HashMap<String, Completion>>,
    next_invocation: AtomicU64,
    connected: AtomicBool,
    /// Set once `Closed` has been emitted
    closed: AtomicBool,
    stop_tx: watch::Sender<bool>,
    connection_id: Mutex<Option<String>>,
}

/// A hub connection with transport-level auto-reconnect.
///
/// Every (re)connect asks the token provider for a fresh bearer token and
/// performs the protocol handshake before the link counts as open.
pub struct HubConnection {
    inner: Arc<Inner>,
}

impl HubConnection {
    pub fn new(
        url: Url,
        reconnect: ReconnectConfig,
        tokens: Arc<dyn TokenProvider>,
        events: EventSink,
    ) -> Self {
        let (outbound, outbound_rx) = unbounded();
        let (stop_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                url,
                reconnect,
                tokens,
                events,
                outbound,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                pending: Mutex::new(HashMap::new()),
                next_invocation: AtomicU64::new(0),
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                stop_tx,
                connection_id: Mutex::new(None),
            }),
        }
    }

    /// Id of the current physical connection, if open.
    pub fn connection_id(&self) -> Option<String> {
        if self.inner.connected.load(Ordering::SeqCst) {
            lock(&self.inner.connection_id).clone()
        } else {
            None
        }
    }
}

impl Inner {
    fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    fn emit_closed(&self, error: Option<String>) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.events.emit(TransportEvent::Closed(error));
        }
    }

    /// Dropping the senders fails every waiting invocation.
    fn fail_pending(&self) {
        lock(&self.pending).clear();
    }

    fn mark_connected(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        *lock(&self.connection_id) = Some(id.clone());
        self.connected.store(true, Ordering::SeqCst);
        id
    }

    /// Connect the socket and complete the handshake.
    ///
    /// Returns any frames the server sent in the same message as its
    /// handshake reply.
    async fn open_socket(&self) -> LiveResult<(WsStream, Vec<String>)> {
        let token = self.tokens.access_token().await.unwrap_or_default();

        let mut url = self.url.clone();
        if !token.is_empty() {
            url.query_pairs_mut().append_pair("access_token", &token);
        }

        let mut request = url.as_str().into_client_request()?;
        if !token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                LiveError::Config(format!("access token is not a valid header value: {}", e))
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (mut socket, _response) = connect_async(request).await?;
        socket.send(Message::text(handshake_request())).await?;

        let leftovers = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_handshake(&mut socket))
            .await
            .map_err(|_| LiveError::Handshake("timed out waiting for handshake response".to_string()))??;

        Ok((socket, leftovers))
    }

    fn handle_frame(&self, frame: &str) -> Option<Drive> {
        match HubMessage::parse(frame) {
            Ok(HubMessage::Invocation {
                target, arguments, ..
            }) => {
                let payload = arguments.into_iter().next().unwrap_or(Value::Null);
                self.events.emit(TransportEvent::Message { target, payload });
                None
            }
            Ok(HubMessage::Completion {
                invocation_id,
                result,
                error,
            }) => {
                let waiter = lock(&self.pending).remove(&invocation_id);
                match waiter {
                    Some(tx) => {
                        let outcome = match error {
                            Some(error) => Err(error),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                    None => crate::log_debug!("Completion for unknown invocation {}", invocation_id),
                }
                None
            }
            Ok(HubMessage::Ping) => None,
            Ok(HubMessage::Close {
                error,
                allow_reconnect: true,
            }) => Some(Drive::Lost(
                error.unwrap_or_else(|| "server requested reconnect".to_string()),
            )),
            Ok(HubMessage::Close {
                error,
                allow_reconnect: false,
            }) => Some(Drive::Closed(error)),
            Err(e) => {
                crate::log_warn!("Dropping hub frame from {}: {}", self.url, e);
                None
            }
        }
    }

    /// Pump one physical socket until it ends.
    async fn drive(
        &self,
        socket: &mut WsStream,
        leftovers: Vec<String>,
        outbound_rx: &mut UnboundedReceiver<String>,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Drive {
        for frame in &leftovers {
            if let Some(outcome) = self.handle_frame(frame) {
                return outcome;
            }
        }

        let mut keep_alive = tokio::time::interval_at(
            tokio::time::Instant::now() + KEEP_ALIVE_INTERVAL,
            KEEP_ALIVE_INTERVAL,
        );

        loop {
            if *stop_rx.borrow() {
                return Drive::Stopped;
            }

            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        return Drive::Stopped;
                    }
                }
                frame = outbound_rx.next() => match frame {
                    Some(frame) => {
                        if let Err(e) = socket.send(Message::text(frame)).await {
                            return Drive::Lost(e.to_string());
                        }
                    }
                    None => return Drive::Stopped,
                },
                _ = keep_alive.tick() => {
                    if let Err(e) = socket.send(Message::text(HubMessage::Ping.to_frame())).await {
                        return Drive::Lost(e.to_string());
                    }
                }
                message = socket.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        for frame in split_frames(text.as_str()) {
                            if let Some(outcome) = self.handle_frame(frame) {
                                return outcome;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Drive::Lost("server closed the socket".to_string());
                    }
                    Some(Ok(_)) => {
                        // Binary, ping and pong frames carry nothing for us
                    }
                    Some(Err(e)) => return Drive::Lost(e.to_string()),
                    None => return Drive::Lost("connection ended".to_string()),
                },
            }
        }
    }

    /// Transport-level retry loop.
    ///
    /// `Err(None)` means `stop()` interrupted it, `Err(Some(_))` that every
    /// attempt failed.
    async fn reconnect(
        &self,
        stop_rx: &mut watch::Receiver<bool>,
        mut last_error: String,
    ) -> Result<(WsStream, Vec<String>), Option<String>> {
        let mut attempt = 0u32;

        loop {
            if self.reconnect.max_attempts > 0 && attempt >= self.reconnect.max_attempts {
                return Err(Some(last_error));
            }

            let delay = self.reconnect.delay(attempt);
            crate::log_info!(
                "Reconnecting to {} in {:?} (attempt {})",
                self.url,
                delay,
                attempt + 1
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stopped(stop_rx) => return Err(None),
            }

            let opened = tokio::select! {
                opened = self.open_socket() => opened,
                _ = stopped(stop_rx) => return Err(None),
            };

            match opened {
                Ok(opened) => return Ok(opened),
                Err(e) => {
                    crate::log_warn!("Reconnect to {} failed: {}", self.url, e);
                    last_error = e.to_string();
                }
            }

            attempt += 1;
        }
    }

    async fn run(
        self: Arc<Self>,
        mut socket: WsStream,
        mut leftovers: Vec<String>,
        mut outbound_rx: UnboundedReceiver<String>,
    ) {
        let mut stop_rx = self.stop_tx.subscribe();

        loop {
            let outcome = self
                .drive(
                    &mut socket,
                    std::mem::take(&mut leftovers),
                    &mut outbound_rx,
                    &mut stop_rx,
                )
                .await;

            self.connected.store(false, Ordering::SeqCst);
            self.fail_pending();

            match outcome {
                Drive::Stopped => {
                    let _ = socket.close(None).await;
                    self.emit_closed(None);
                    return;
                }
                Drive::Closed(error) => {
                    crate::log_info!("Hub {} closed the connection: {:?}", self.url, error);
                    let _ = socket.close(None).await;
                    self.emit_closed(error);
                    return;
                }
                Drive::Lost(reason) => {
                    if self.is_stopped() {
                        self.emit_closed(None);
                        return;
                    }

                    crate::log_warn!("Connection to {} lost: {}", self.url, reason);
                    self.events
                        .emit(TransportEvent::Reconnecting(Some(reason.clone())));

                    match self.reconnect(&mut stop_rx, reason).await {
                        Ok((next_socket, frames)) => {
                            socket = next_socket;
                            leftovers = frames;
                            let id = self.mark_connected();
                            crate::log_info!("Reconnected to {} as {}", self.url, id);
                            self.events.emit(TransportEvent::Reconnected(id));
                        }
                        Err(error) => {
                            self.emit_closed(error);
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn read_handshake(socket: &mut WsStream) -> LiveResult<Vec<String>> {
    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(text) => {
                let mut frames = split_frames(text.as_str());
                let Some(first) = frames.next() else {
                    continue;
                };
                parse_handshake_response(first)?;
                return Ok(frames.map(str::to_string).collect());
            }
            Message::Close(_) => {
                return Err(LiveError::Handshake(
                    "server closed the socket during handshake".to_string(),
                ))
            }
            _ => {}
        }
    }

    Err(LiveError::Handshake(
        "stream ended before handshake response".to_string(),
    ))
}

#[async_trait]
impl Invoker for HubConnection {
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> LiveResult<Value> {
        let inner = &self.inner;
        if !inner.connected.load(Ordering::SeqCst) {
            return Err(LiveError::ConnectionClosed(format!(
                "cannot invoke {} while disconnected",
                method
            )));
        }

        let id = inner.next_invocation.fetch_add(1, Ordering::SeqCst).to_string();
        let (tx, rx) = oneshot::channel();
        lock(&inner.pending).insert(id.clone(), tx);

        let frame = HubMessage::invocation(id.as_str(), method, arguments).to_frame();
        if inner.outbound.unbounded_send(frame).is_err() {
            lock(&inner.pending).remove(&id);
            return Err(LiveError::ConnectionClosed("send queue closed".to_string()));
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(LiveError::InvocationRejected {
                method: method.to_string(),
                reason,
            }),
            Err(_) => Err(LiveError::ConnectionClosed(format!(
                "connection dropped before {} completed",
                method
            ))),
        }
    }
}

#[async_trait]
impl Transport for HubConnection {
    async fn start(&self) -> LiveResult<()> {
        let inner = &self.inner;
        if inner.is_stopped() {
            return Err(LiveError::ConnectionClosed(
                "connection was stopped".to_string(),
            ));
        }

        let outbound_rx = lock(&inner.outbound_rx)
            .take()
            .ok_or_else(|| LiveError::ConnectionClosed("connection already started".to_string()))?;

        let mut stop_rx = inner.stop_tx.subscribe();
        let (socket, leftovers) = tokio::select! {
            opened = inner.open_socket() => opened?,
            _ = stopped(&mut stop_rx) => {
                return Err(LiveError::ConnectionClosed("stopped while connecting".to_string()));
            }
        };

        let id = inner.mark_connected();
        crate::log_info!("Hub connection {} open to {}", id, inner.url);

        tokio::spawn(Arc::clone(inner).run(socket, leftovers, outbound_rx));
        Ok(())
    }

    async fn stop(&self) {
        let inner = &self.inner;
        inner.stop_tx.send_replace(true);
        inner.connected.store(false, Ordering::SeqCst);
        inner.fail_pending();
        inner.emit_closed(None);
    }
}
