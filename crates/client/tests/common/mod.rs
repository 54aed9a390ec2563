//! Shared test fixtures: a scripted in-memory transport and an in-process hub.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use contest_live_client::error::{LiveError, LiveResult};
use contest_live_client::ws::{Connector, EventSink, Invoker, Transport, TransportEvent};
use contest_live_client::LiveStatus;
use contest_live_shared::{split_frames, HubMessage};
use serde_json::Value;
use tokio::sync::{watch, Notify};

pub const UPDATE_EVENT: &str = "ReceiveLeaderboardUpdate";

/// Wait (in tokio time) until the status satisfies `predicate`.
pub async fn wait_for_status(
    status: &mut watch::Receiver<LiveStatus>,
    predicate: impl FnMut(&LiveStatus) -> bool,
) -> LiveStatus {
    tokio::time::timeout(Duration::from_secs(120), status.wait_for(predicate))
        .await
        .expect("status condition not reached in time")
        .expect("manager stopped")
        .clone()
}

/// Let every spawned task run to quiescence.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[derive(Default)]
struct Script {
    start_results: VecDeque<Result<(), String>>,
    early_events: VecDeque<Vec<TransportEvent>>,
    accepts: Vec<String>,
    gate: Option<Arc<Notify>>,
    opened: Vec<Arc<FakeTransport>>,
}

/// Hands out [`FakeTransport`]s whose start results follow a script.
#[derive(Clone, Default)]
pub struct FakeConnector {
    script: Arc<Mutex<Script>>,
}

impl FakeConnector {
    /// Join methods the fake server accepts. Defaults to none.
    pub fn accepting(methods: &[&str]) -> Self {
        let connector = Self::default();
        connector.script.lock().unwrap().accepts = methods.iter().map(|m| m.to_string()).collect();
        connector
    }

    /// Queue start results; once drained, starts succeed.
    pub fn push_start_results(&self, results: impl IntoIterator<Item = Result<(), String>>) {
        self.script.lock().unwrap().start_results.extend(results);
    }

    /// Events the next transports report from inside `start()`, before it
    /// returns. One entry per transport.
    pub fn push_early_events(&self, events: impl IntoIterator<Item = Vec<TransportEvent>>) {
        self.script.lock().unwrap().early_events.extend(events);
    }

    /// Make the next transport wait in `start()` until the returned handle is notified.
    pub fn gate_next_start(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script.lock().unwrap().gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn opened(&self) -> usize {
        self.script.lock().unwrap().opened.len()
    }

    pub fn transport(&self, index: usize) -> Arc<FakeTransport> {
        Arc::clone(&self.script.lock().unwrap().opened[index])
    }

    pub fn last(&self) -> Arc<FakeTransport> {
        let script = self.script.lock().unwrap();
        Arc::clone(script.opened.last().expect("no transport opened"))
    }
}

impl Connector for FakeConnector {
    fn open(&self, events: EventSink) -> Arc<dyn Transport> {
        let mut script = self.script.lock().unwrap();
        let transport = Arc::new(FakeTransport {
            events,
            start_result: script.start_results.pop_front().unwrap_or(Ok(())),
            gate: script.gate.take(),
            early_events: script.early_events.pop_front().unwrap_or_default(),
            accepts: script.accepts.clone(),
            invocations: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        script.opened.push(Arc::clone(&transport));
        transport
    }
}

pub struct FakeTransport {
    events: EventSink,
    start_result: Result<(), String>,
    gate: Option<Arc<Notify>>,
    early_events: Vec<TransportEvent>,
    accepts: Vec<String>,
    invocations: Mutex<Vec<(String, Vec<Value>)>>,
    stopped: AtomicBool,
    /// `Closed` is reported at most once, like the real transport
    closed: AtomicBool,
}

impl FakeTransport {
    /// Report an event as if it came from the network.
    pub fn emit(&self, event: TransportEvent) {
        if matches!(event, TransportEvent::Closed(_)) && self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.events.emit(event);
    }

    pub fn broadcast(&self, target: &str, payload: Value) {
        self.emit(TransportEvent::Message {
            target: target.to_string(),
            payload,
        });
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    pub fn arguments(&self) -> Vec<Vec<Value>> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invoker for FakeTransport {
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> LiveResult<Value> {
        self.invocations
            .lock()
            .unwrap()
            .push((method.to_string(), arguments));
        if self.accepts.iter().any(|m| m == method) {
            Ok(Value::Null)
        } else {
            Err(LiveError::InvocationRejected {
                method: method.to_string(),
                reason: format!("Method does not exist: {}", method),
            })
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn start(&self) -> LiveResult<()> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        for event in &self.early_events {
            self.emit(event.clone());
        }
        self.start_result
            .clone()
            .map_err(LiveError::ConnectionClosed)
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Closed(None));
    }
}

/// What a hub session does right after it accepted a join.
#[derive(Debug, Clone)]
pub enum AfterJoin {
    Stay,
    /// Close the websocket without a hub close message.
    Drop,
    /// Send a hub `Close` message, then end the session.
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

/// Control and record of the in-process hub.
#[derive(Clone, Default)]
pub struct HubHandle {
    pub queries: Arc<Mutex<Vec<Option<String>>>>,
    pub invocations: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
    /// Upgrade requests, refused ones included
    attempts: Arc<AtomicUsize>,
    /// One plan per upcoming session; later sessions stay open
    plans: Arc<Mutex<VecDeque<AfterJoin>>>,
    session_limit: Arc<Mutex<Option<usize>>>,
}

impl HubHandle {
    pub fn plan(&self, after_join: AfterJoin) {
        self.plans.lock().unwrap().push_back(after_join);
    }

    /// Answer upgrade requests with 503 once `limit` sessions have been served.
    pub fn limit_sessions(&self, limit: Option<usize>) {
        *self.session_limit.lock().unwrap() = limit;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    /// Wait (in real time) until the hub has seen `count` invocations.
    pub async fn wait_for_invocations(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.invocations.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("hub did not see enough invocations");
    }
}

#[derive(Clone)]
struct HubState {
    handle: HubHandle,
    accepts: Arc<Vec<String>>,
    broadcast: Value,
}

/// Serve a leaderboard hub on an ephemeral port.
///
/// It completes the handshake, accepts only `accepts` as join methods and,
/// after a successful join, broadcasts `broadcast` once and then follows the
/// session's [`AfterJoin`] plan.
pub async fn spawn_hub(accepts: &[&str], broadcast: Value) -> (SocketAddr, HubHandle) {
    let handle = HubHandle::default();
    let state = HubState {
        handle: handle.clone(),
        accepts: Arc::new(accepts.iter().map(|m| m.to_string()).collect()),
        broadcast,
    };

    let app = Router::new()
        .route("/hubs/leaderboard", get(hub_upgrade))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind hub listener");
    let addr = listener.local_addr().expect("hub address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, handle)
}

async fn hub_upgrade(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    State(state): State<HubState>,
) -> Response {
    state.handle.attempts.fetch_add(1, Ordering::SeqCst);
    let limit = *state.handle.session_limit.lock().unwrap();
    if limit.is_some_and(|limit| state.handle.sessions() >= limit) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    state.handle.queries.lock().unwrap().push(query);
    let after_join = state
        .handle
        .plans
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(AfterJoin::Stay);
    ws.on_upgrade(move |socket| hub_session(socket, state, after_join))
}

async fn send_text(socket: &mut WebSocket, text: String) -> bool {
    socket.send(Message::Text(text.into())).await.is_ok()
}

async fn hub_session(mut socket: WebSocket, state: HubState, after_join: AfterJoin) {
    // Handshake
    match socket.recv().await {
        Some(Ok(Message::Text(text))) if text.as_str().contains("\"protocol\":\"json\"") => {
            if !send_text(&mut socket, "{}\u{1e}".to_string()).await {
                return;
            }
        }
        _ => return,
    }

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        for frame in split_frames(text.as_str()) {
            let Ok(HubMessage::Invocation {
                invocation_id: Some(id),
                target,
                arguments,
            }) = HubMessage::parse(frame)
            else {
                continue;
            };
            state
                .handle
                .invocations
                .lock()
                .unwrap()
                .push((target.clone(), arguments));

            let accepted = state.accepts.iter().any(|m| *m == target);
            let completion = HubMessage::Completion {
                invocation_id: id,
                result: accepted.then_some(Value::Null),
                error: (!accepted).then(|| "Method does not exist.".to_string()),
            };
            if !send_text(&mut socket, completion.to_frame()).await {
                return;
            }
            if !accepted {
                continue;
            }

            let update = HubMessage::broadcast(UPDATE_EVENT, state.broadcast.clone());
            if !send_text(&mut socket, update.to_frame()).await {
                return;
            }

            match &after_join {
                AfterJoin::Stay => {}
                AfterJoin::Drop => {
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
                AfterJoin::Close {
                    error,
                    allow_reconnect,
                } => {
                    let close = HubMessage::Close {
                        error: error.clone(),
                        allow_reconnect: *allow_reconnect,
                    };
                    let _ = send_text(&mut socket, close.to_frame()).await;
                    return;
                }
            }
        }
    }
}
