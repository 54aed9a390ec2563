//! Leaderboard data models shared between the live channel and snapshot queries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// --- Topics ---

/// Identifier of one contest's leaderboard broadcast group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank topics never open a connection.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// --- Leaderboard ---

/// Team identifiers arrive as numbers from some backends and strings from others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TeamId {
    Number(i64),
    Text(String),
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamId::Number(n) => write!(f, "{}", n),
            TeamId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for TeamId {
    fn from(value: i64) -> Self {
        TeamId::Number(value)
    }
}

impl From<&str> for TeamId {
    fn from(value: &str) -> Self {
        TeamId::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub id: Option<TeamId>,
    #[serde(
        default,
        alias = "fullName",
        alias = "userName",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
}

/// One row of a contest ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub team_id: TeamId,
    #[serde(default)]
    pub team_name: String,
    #[serde(default)]
    pub score: f64,
    /// Server-assigned rank. When absent the position in the list is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

impl LeaderboardEntry {
    pub fn new(team_id: impl Into<TeamId>, team_name: impl Into<String>, score: f64) -> Self {
        Self {
            team_id: team_id.into(),
            team_name: team_name.into(),
            score,
            rank: None,
            members: Vec::new(),
        }
    }

    /// Rank to display for this entry given its zero-based position in the list.
    pub fn display_rank(&self, index: usize) -> u32 {
        self.rank.unwrap_or(index as u32 + 1)
    }
}

/// Response body of the pull (snapshot) leaderboard query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSnapshot {
    #[serde(default)]
    pub teams: Vec<LeaderboardEntry>,
}

/// Object keys that may hold the entry list of a push payload, in lookup order.
pub const PAYLOAD_LIST_KEYS: [&str; 3] = ["teams", "teamIdList", "entries"];

/// Result of normalizing a push payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub entries: Vec<LeaderboardEntry>,
    /// Number of list elements that could not be read as entries.
    pub skipped: usize,
}

/// Normalize a push payload into leaderboard entries.
///
/// Accepts a bare array, or an object carrying the array under one of
/// [`PAYLOAD_LIST_KEYS`]. Any other shape yields no entries.
pub fn normalize_payload(payload: &Value) -> Normalized {
    let list = match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => PAYLOAD_LIST_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    };

    let Some(items) = list else {
        return Normalized::default();
    };

    let mut normalized = Normalized::default();
    for item in items {
        match LeaderboardEntry::deserialize(item) {
            Ok(entry) => normalized.entries.push(entry),
            Err(_) => normalized.skipped += 1,
        }
    }
    normalized
}
