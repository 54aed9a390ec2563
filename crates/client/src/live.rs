//! Live leaderboard: a [`LiveSync`] connection feeding a [`LeaderboardStore`].
//!
//! This is what a ranking page holds on to. It owns the connection for the
//! page's contest, routes push updates into the store, and republishes the
//! merged ranking on a watch channel.

use std::sync::{Arc, Mutex, MutexGuard};

use contest_live_shared::{LeaderboardSnapshot, Topic};
use tokio::sync::watch;

use crate::config::LiveSyncConfig;
use crate::stores::{LeaderboardStore, RankingView};
use crate::ws::{Connector, LiveStatus, LiveSync};

type SharedStore = Arc<Mutex<LeaderboardStore>>;

fn lock(store: &SharedStore) -> MutexGuard<'_, LeaderboardStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct LiveLeaderboard {
    sync: LiveSync,
    store: SharedStore,
    view: Arc<watch::Sender<RankingView>>,
}

impl LiveLeaderboard {
    /// Start with no topic. Nothing connects until [`set_topic`](Self::set_topic).
    pub fn spawn(config: LiveSyncConfig, connector: Arc<dyn Connector>) -> Self {
        let store: SharedStore = Arc::new(Mutex::new(LeaderboardStore::new()));
        let (view, _) = watch::channel(RankingView::default());
        let view = Arc::new(view);

        let sync = {
            let store = Arc::clone(&store);
            let view = Arc::clone(&view);
            LiveSync::spawn(config, connector, move |update| {
                let mut store = lock(&store);
                if store.apply_push(&update.topic, &update.payload) {
                    view.send_replace(store.view());
                }
            })
        };

        Self { sync, store, view }
    }

    /// Point the page at a contest (or none) and turn live sync on or off.
    pub fn set_topic(&self, topic: Option<Topic>, enabled: bool) {
        {
            let mut store = lock(&self.store);
            store.set_topic(topic.clone());
            self.view.send_replace(store.view());
        }
        self.sync.configure(topic, enabled);
    }

    /// Feed a pull result. Ignored when `topic` is no longer active.
    pub fn apply_snapshot(&self, topic: &Topic, snapshot: LeaderboardSnapshot) -> bool {
        let mut store = lock(&self.store);
        let applied = store.apply_snapshot(topic, snapshot);
        if applied {
            self.view.send_replace(store.view());
        }
        applied
    }

    pub fn view(&self) -> RankingView {
        self.view.borrow().clone()
    }

    pub fn watch_view(&self) -> watch::Receiver<RankingView> {
        self.view.subscribe()
    }

    pub fn status(&self) -> LiveStatus {
        self.sync.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<LiveStatus> {
        self.sync.watch_status()
    }

    pub fn reconnect(&self) {
        self.sync.reconnect();
    }

    pub fn disconnect(&self) {
        self.sync.disconnect();
    }

    pub async fn shutdown(self) {
        self.sync.shutdown().await;
    }
}
