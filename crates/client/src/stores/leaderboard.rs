//! Leaderboard store: merges the pull snapshot with live push updates.
//!
//! The snapshot comes from the REST query, pushes from the hub. Once a push
//! has been received for the active topic it wins over any later snapshot
//! until the topic changes.

use contest_live_shared::{normalize_payload, LeaderboardEntry, LeaderboardSnapshot, Topic};
use serde_json::Value;

/// Where the entries of a [`RankingView`] came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankingSource {
    #[default]
    Empty,
    Snapshot,
    Live,
}

/// The ranking a consumer should display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingView {
    pub source: RankingSource,
    pub entries: Vec<LeaderboardEntry>,
}

impl RankingView {
    /// Entries paired with their display rank.
    pub fn ranked(&self) -> impl Iterator<Item = (u32, &LeaderboardEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.display_rank(index), entry))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Combine the latest snapshot with the latest push. Push wins when present.
pub fn merge(
    snapshot: Option<&LeaderboardSnapshot>,
    push: Option<&[LeaderboardEntry]>,
) -> RankingView {
    match (push, snapshot) {
        (Some(entries), _) => RankingView {
            source: RankingSource::Live,
            entries: entries.to_vec(),
        },
        (None, Some(snapshot)) => RankingView {
            source: RankingSource::Snapshot,
            entries: snapshot.teams.clone(),
        },
        (None, None) => RankingView::default(),
    }
}

/// Per-topic merge state.
#[derive(Debug, Clone, Default)]
pub struct LeaderboardStore {
    topic: Option<Topic>,
    snapshot: Option<LeaderboardSnapshot>,
    push: Option<Vec<LeaderboardEntry>>,
}

impl LeaderboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to another topic. Both stored lists are dropped on change.
    pub fn set_topic(&mut self, topic: Option<Topic>) {
        let topic = topic.filter(|t| !t.is_blank());
        if topic == self.topic {
            return;
        }
        self.topic = topic;
        self.snapshot = None;
        self.push = None;
    }

    /// Store a pull result. Returns `false` if it belongs to another topic.
    pub fn apply_snapshot(&mut self, topic: &Topic, snapshot: LeaderboardSnapshot) -> bool {
        if !self.is_current(topic) {
            crate::log_debug!("Dropping snapshot for inactive topic {}", topic);
            return false;
        }
        self.snapshot = Some(snapshot);
        true
    }

    /// Store a push payload. Returns `false` if it belongs to another topic.
    ///
    /// A payload of unknown shape still counts as a push and yields an empty
    /// live list.
    pub fn apply_push(&mut self, topic: &Topic, payload: &Value) -> bool {
        if !self.is_current(topic) {
            crate::log_debug!("Dropping push for inactive topic {}", topic);
            return false;
        }

        let normalized = normalize_payload(payload);
        if normalized.skipped > 0 {
            crate::log_warn!(
                "Skipped {} malformed leaderboard entries for {}",
                normalized.skipped,
                topic
            );
        }
        self.push = Some(normalized.entries);
        true
    }

    pub fn has_live_data(&self) -> bool {
        self.push.is_some()
    }

    pub fn view(&self) -> RankingView {
        merge(self.snapshot.as_ref(), self.push.as_deref())
    }

    fn is_current(&self, topic: &Topic) -> bool {
        self.topic.as_ref() == Some(topic)
    }
}
