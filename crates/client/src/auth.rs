//! Bearer token sources consulted whenever the hub connection (re)connects.
//!
//! Obtaining a token (login) happens elsewhere; these only hand out what the
//! application already has.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::Storage;

/// Storage key under which the signed-in session keeps its credentials.
pub const CREDENTIALS_KEY: &str = "contest_live_credentials";

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token. `None` connects with an empty credential.
    async fn access_token(&self) -> Option<String>;
}

/// No credentials at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

#[async_trait]
impl TokenProvider for NoToken {
    async fn access_token(&self) -> Option<String> {
        None
    }
}

/// A fixed token, e.g. from the environment.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Option<String> {
        let token = self.0.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}

/// Credentials persisted by the signed-in session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredCredentials {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Reads the token from [`Storage`] at every call, so a refreshed login is
/// picked up by the next reconnect.
#[derive(Debug, Clone)]
pub struct StoredToken {
    storage: Option<Storage>,
    key: String,
}

impl StoredToken {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage: Some(storage),
            key: CREDENTIALS_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

impl Default for StoredToken {
    fn default() -> Self {
        Self {
            storage: Storage::platform(),
            key: CREDENTIALS_KEY.to_string(),
        }
    }
}

#[async_trait]
impl TokenProvider for StoredToken {
    async fn access_token(&self) -> Option<String> {
        let credentials: StoredCredentials = self.storage.as_ref()?.load(&self.key)?;
        if credentials.is_expired(Utc::now()) {
            crate::log_warn!("Stored access token expired; connecting without credentials");
            return None;
        }
        Some(credentials.access_token)
    }
}
