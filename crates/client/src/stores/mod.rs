//! Client-side state stores.

pub mod leaderboard;

pub use leaderboard::{merge, LeaderboardStore, RankingSource, RankingView};
