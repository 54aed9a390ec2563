//! Contest Live Client - live leaderboard synchronization
//!
//! Keeps a contest ranking in sync with server-pushed score updates over a
//! hub websocket, survives dropped connections and server restarts, and
//! merges live data with the REST snapshot.

pub mod logging;

pub mod auth;
pub mod config;
pub mod error;
pub mod live;
pub mod storage;
pub mod stores;
pub mod ws;

pub use auth::{NoToken, StaticToken, StoredToken, TokenProvider};
pub use config::LiveSyncConfig;
pub use error::{LiveError, LiveResult};
pub use live::LiveLeaderboard;
pub use stores::{LeaderboardStore, RankingSource, RankingView};
pub use ws::{ConnectionState, HubConnector, LiveStatus, LiveSync, LiveUpdate};
