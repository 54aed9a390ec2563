//! Live leaderboard configuration, with environment overrides.

use std::time::Duration;

use url::Url;

use crate::error::{LiveError, LiveResult};
use crate::ws::ReconnectConfig;

/// Hub method names that have been used for "join the broadcast group of a
/// contest", most recent first.
pub const DEFAULT_JOIN_METHODS: [&str; 4] = [
    "JoinContestGroup",
    "JoinContest",
    "JoinGroup",
    "SubscribeToContest",
];

/// Broadcast target carrying leaderboard updates.
pub const DEFAULT_UPDATE_EVENT: &str = "ReceiveLeaderboardUpdate";

pub const DEFAULT_HUB_PATH: &str = "/hubs/leaderboard";

/// Delay before a manual retry after an error-carrying close.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 3000;

/// Manual retries allowed before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct LiveSyncConfig {
    /// Base URL of the backend, e.g. `https://contest.example.org`
    pub endpoint: Url,
    /// Path of the leaderboard hub below `endpoint`
    pub hub_path: String,
    /// Inbound broadcast target that carries leaderboard payloads
    pub update_event: String,
    /// Join methods tried in order until one succeeds
    pub join_methods: Vec<String>,
    /// Delay before a manual retry after an error-carrying close
    pub retry_delay: Duration,
    /// Manual retries allowed before the manager gives up
    pub max_retries: u32,
    /// Automatic reconnect behaviour of the transport itself
    pub transport: ReconnectConfig,
}

impl Default for LiveSyncConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse("http://localhost:5000").expect("static URL is valid"),
            hub_path: DEFAULT_HUB_PATH.to_string(),
            update_event: DEFAULT_UPDATE_EVENT.to_string(),
            join_methods: DEFAULT_JOIN_METHODS.iter().map(|m| m.to_string()).collect(),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_retries: MAX_RECONNECT_ATTEMPTS,
            transport: ReconnectConfig::default(),
        }
    }
}

impl LiveSyncConfig {
    /// Build a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CONTEST_LIVE_ENDPOINT`: backend base URL (default: "http://localhost:5000")
    /// - `CONTEST_LIVE_HUB_PATH`: hub path (default: "/hubs/leaderboard")
    /// - `CONTEST_LIVE_EVENT`: broadcast target (default: "ReceiveLeaderboardUpdate")
    /// - `CONTEST_LIVE_JOIN_METHODS`: comma separated join methods
    /// - `CONTEST_LIVE_RETRY_DELAY_MS`: manual retry delay (default: 3000)
    /// - `CONTEST_LIVE_MAX_RETRIES`: manual retry cap (default: 5)
    pub fn from_env() -> LiveResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LiveResult<Self> {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("CONTEST_LIVE_ENDPOINT") {
            config.endpoint = Url::parse(&endpoint)?;
        }
        if let Some(path) = lookup("CONTEST_LIVE_HUB_PATH") {
            config.hub_path = path;
        }
        if let Some(event) = lookup("CONTEST_LIVE_EVENT") {
            config.update_event = event;
        }
        if let Some(methods) = lookup("CONTEST_LIVE_JOIN_METHODS") {
            config.join_methods = methods
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(delay) = lookup("CONTEST_LIVE_RETRY_DELAY_MS") {
            let ms = delay
                .parse::<u64>()
                .map_err(|e| LiveError::Config(format!("CONTEST_LIVE_RETRY_DELAY_MS: {}", e)))?;
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(max) = lookup("CONTEST_LIVE_MAX_RETRIES") {
            config.max_retries = max
                .parse::<u32>()
                .map_err(|e| LiveError::Config(format!("CONTEST_LIVE_MAX_RETRIES: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LiveResult<()> {
        if self.max_retries == 0 {
            return Err(LiveError::Config("max_retries must be > 0".to_string()));
        }
        if self.join_methods.is_empty() {
            return Err(LiveError::Config(
                "at least one join method is required".to_string(),
            ));
        }
        if self.update_event.trim().is_empty() {
            return Err(LiveError::Config("update_event must not be empty".to_string()));
        }
        self.transport.validate().map_err(LiveError::Config)
    }

    /// Websocket URL of the hub, with `http(s)` mapped to `ws(s)`.
    pub fn hub_url(&self) -> LiveResult<Url> {
        let mut url = self.endpoint.join(&self.hub_path)?;
        let scheme = match url.scheme() {
            "http" => Some("ws"),
            "https" => Some("wss"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            url.set_scheme(scheme)
                .map_err(|_| LiveError::Config(format!("cannot use scheme {} for {}", scheme, url)))?;
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = LiveSyncConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(3000));
        assert_eq!(config.join_methods.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_overrides_from_lookup() {
        let config = LiveSyncConfig::from_lookup(lookup(&[
            ("CONTEST_LIVE_ENDPOINT", "https://judge.example.org"),
            ("CONTEST_LIVE_JOIN_METHODS", "JoinA, ,JoinB"),
            ("CONTEST_LIVE_RETRY_DELAY_MS", "250"),
            ("CONTEST_LIVE_MAX_RETRIES", "2"),
        ]))
        .unwrap();

        assert_eq!(config.join_methods, vec!["JoinA", "JoinB"]);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.max_retries, 2);
        assert_eq!(
            config.hub_url().unwrap().as_str(),
            "wss://judge.example.org/hubs/leaderboard"
        );
    }

    #[test]
    fn rejects_unusable_values() {
        assert!(LiveSyncConfig::from_lookup(lookup(&[("CONTEST_LIVE_MAX_RETRIES", "0")])).is_err());
        assert!(LiveSyncConfig::from_lookup(lookup(&[("CONTEST_LIVE_JOIN_METHODS", " , ")])).is_err());
        assert!(LiveSyncConfig::from_lookup(lookup(&[("CONTEST_LIVE_RETRY_DELAY_MS", "soon")])).is_err());
        assert!(LiveSyncConfig::from_lookup(lookup(&[("CONTEST_LIVE_ENDPOINT", "::")])).is_err());
    }

    #[test]
    fn plain_http_maps_to_ws() {
        let config = LiveSyncConfig::default();
        assert_eq!(config.hub_url().unwrap().as_str(), "ws://localhost:5000/hubs/leaderboard");
    }
}
