//! The websocket transport against an in-process hub.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{spawn_hub, wait_for_status};
use contest_live_client::config::LiveSyncConfig;
use contest_live_client::{HubConnector, LiveLeaderboard, NoToken, RankingSource, StaticToken};
use contest_live_shared::{LeaderboardEntry, Topic};
use serde_json::json;
use url::Url;

fn config_for(addr: std::net::SocketAddr) -> LiveSyncConfig {
    LiveSyncConfig {
        endpoint: Url::parse(&format!("http://{}", addr)).unwrap(),
        ..LiveSyncConfig::default()
    }
}

#[tokio::test]
async fn handshake_join_fallback_and_broadcast() {
    let (addr, log) = spawn_hub(
        &["JoinContest"],
        json!({"teams": [{"teamId": 1, "teamName": "Alpha", "score": 120}]}),
    )
    .await;
    let config = config_for(addr);
    let connector = HubConnector::new(&config, Arc::new(StaticToken::new("jwt-abc"))).unwrap();
    assert_eq!(connector.url().scheme(), "ws");

    let live = LiveLeaderboard::spawn(config, Arc::new(connector));
    live.set_topic(Some(Topic::new("c1")), true);

    let mut status = live.watch_status();
    let joined = tokio::time::timeout(
        Duration::from_secs(10),
        wait_for_status(&mut status, |s| s.joined_via.is_some()),
    )
    .await
    .unwrap();
    assert!(joined.is_connected);
    assert_eq!(joined.joined_via.as_deref(), Some("JoinContest"));

    let mut view = live.watch_view();
    let view = tokio::time::timeout(
        Duration::from_secs(10),
        view.wait_for(|v| v.source == RankingSource::Live),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(view.entries, vec![LeaderboardEntry::new(1, "Alpha", 120.0)]);

    let invocations = log.invocations.lock().unwrap().clone();
    let methods: Vec<_> = invocations.iter().map(|(m, _)| m.as_str()).collect();
    assert_eq!(methods, vec!["JoinContestGroup", "JoinContest"]);
    assert_eq!(invocations[1].1, vec![json!("c1")]);

    let queries = log.queries.lock().unwrap().clone();
    assert_eq!(queries, vec![Some("access_token=jwt-abc".to_string())]);

    live.shutdown().await;
}

#[tokio::test]
async fn connects_without_token() {
    let (addr, log) = spawn_hub(&["JoinContestGroup"], json!([])).await;
    let config = config_for(addr);
    let connector = HubConnector::new(&config, Arc::new(NoToken)).unwrap();

    let live = LiveLeaderboard::spawn(config, Arc::new(connector));
    live.set_topic(Some(Topic::new("c2")), true);

    let mut status = live.watch_status();
    let joined = tokio::time::timeout(
        Duration::from_secs(10),
        wait_for_status(&mut status, |s| s.joined_via.is_some()),
    )
    .await
    .unwrap();
    assert_eq!(joined.joined_via.as_deref(), Some("JoinContestGroup"));
    assert_eq!(*log.queries.lock().unwrap(), vec![None]);

    live.disconnect();
    let stopped = wait_for_status(&mut status, |s| !s.is_connected).await;
    assert_eq!(stopped.last_error, None);

    live.shutdown().await;
}
