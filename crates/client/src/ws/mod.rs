//! Hub connection for live leaderboard updates.
//!
//! This module provides:
//! - A transport over the JSON hub protocol with its own short reconnect loop
//! - Group join with fallback across the method names the backend has used
//! - A manual retry policy on top of the transport's own reconnects
//! - The connection manager that ties them to one `(topic, enabled)` pair
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     LiveSync                        │
//! │   (actor task: one connection per topic/enabled)    │
//! └─────────────────────────────────────────────────────┘
//!          │              │              │
//!          ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────────┐
//!   │ Transport  │ │ JoinTable  │ │ReconnectPolicy │
//!   │ (hub link) │ │ (join)     │ │ (FSM)          │
//!   └────────────┘ └────────────┘ └────────────────┘
//!          │
//!          ▼
//!   on_update(LiveUpdate) ──▶ LeaderboardStore
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let connector = Arc::new(HubConnector::new(&config, Arc::new(NoToken))?);
//! let live = LiveSync::spawn(config, connector, |update| {
//!     println!("{}: {}", update.topic, update.payload);
//! });
//! live.configure(Some(Topic::new("contest-42")), true);
//! ```

mod connection;
mod manager;
mod policy;
mod resolver;

pub use connection::{
    ConnectionState, Connector, EventSink, HubConnection, HubConnector, Invoker, ReconnectConfig,
    Transport, TransportEvent,
};
pub use manager::{LiveStatus, LiveSync, LiveUpdate};
pub use policy::{Effect, PolicyEvent, ReconnectPolicy, RETRY_EXHAUSTED};
pub use resolver::{JoinOutcome, JoinTable};
