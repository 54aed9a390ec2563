//! Contest Live - command line leaderboard follower
//!
//! Connects to the leaderboard hub for one contest and logs connection status
//! and ranking changes until Ctrl-C.
//!
//! ```text
//! CONTEST_LIVE_ENDPOINT=https://contest.example.org contest-live <contest-id>
//! ```

use std::sync::Arc;

use anyhow::{bail, Context};
use contest_live_client::{
    config::LiveSyncConfig, HubConnector, LiveLeaderboard, StaticToken, StoredToken, TokenProvider,
};
use contest_live_shared::Topic;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("contest_live_client=debug")),
        )
        .init();

    let Some(topic) = std::env::args().nth(1).map(Topic::new) else {
        bail!("usage: contest-live <contest-id>");
    };
    if topic.is_blank() {
        bail!("contest id must not be empty");
    }

    let config = LiveSyncConfig::from_env().context("loading configuration")?;

    let tokens: Arc<dyn TokenProvider> = match std::env::var("CONTEST_LIVE_TOKEN") {
        Ok(token) => Arc::new(StaticToken::new(token)),
        Err(_) => Arc::new(StoredToken::default()),
    };
    let connector = HubConnector::new(&config, tokens).context("building hub connector")?;
    tracing::info!("Following contest {} at {}", topic, connector.url());

    let live = LiveLeaderboard::spawn(config, Arc::new(connector));
    live.set_topic(Some(topic), true);

    let mut status = live.watch_status();
    let mut view = live.watch_view();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("waiting for Ctrl-C")?;
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.is_connected {
                    tracing::info!(
                        "Live (joined via {})",
                        current.joined_via.as_deref().unwrap_or("broadcast only")
                    );
                } else {
                    tracing::info!(
                        "Offline: {:?}{}",
                        current.state,
                        current
                            .last_error
                            .map(|e| format!(" ({})", e))
                            .unwrap_or_default()
                    );
                }
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let ranking = view.borrow_and_update().clone();
                tracing::info!("Ranking updated from {:?}: {} teams", ranking.source, ranking.entries.len());
                for (rank, entry) in ranking.ranked() {
                    tracing::info!("  #{:<3} {:<32} {}", rank, entry.team_name, entry.score);
                }
            }
        }
    }

    live.shutdown().await;
    Ok(())
}
