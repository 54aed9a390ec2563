//! Joins a topic's broadcast group by probing the join methods the backend
//! has used over time.

use std::sync::Arc;

use contest_live_shared::Topic;
use serde_json::Value;

use super::connection::Invoker;

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// The server accepted `method`.
    Joined { method: String },
    /// Every candidate was rejected, as `(method, reason)` pairs. Broadcasts
    /// may still arrive without group membership.
    Unjoined { failures: Vec<(String, String)> },
}

impl JoinOutcome {
    pub fn method(&self) -> Option<&str> {
        match self {
            JoinOutcome::Joined { method } => Some(method),
            JoinOutcome::Unjoined { .. } => None,
        }
    }
}

/// Ordered join candidates; the first one the server accepts wins.
#[derive(Debug, Clone)]
pub struct JoinTable {
    methods: Arc<[String]>,
}

impl JoinTable {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }

    /// Invoke each candidate with the topic id until one succeeds.
    ///
    /// Never fails: exhaustion is logged and reported as
    /// [`JoinOutcome::Unjoined`].
    pub async fn join<I>(&self, invoker: &I, topic: &Topic) -> JoinOutcome
    where
        I: Invoker + ?Sized,
    {
        let mut failures = Vec::new();

        for method in self.methods.iter() {
            match invoker
                .invoke(method, vec![Value::String(topic.to_string())])
                .await
            {
                Ok(_) => {
                    crate::log_info!("Joined leaderboard group {} via {}", topic, method);
                    return JoinOutcome::Joined {
                        method: method.clone(),
                    };
                }
                Err(e) => {
                    crate::log_debug!("Join method {} rejected for {}: {}", method, topic, e);
                    failures.push((method.clone(), e.to_string()));
                }
            }
        }

        crate::log_warn!(
            "No join method accepted topic {}; relying on broadcast delivery",
            topic
        );
        JoinOutcome::Unjoined { failures }
    }
}
