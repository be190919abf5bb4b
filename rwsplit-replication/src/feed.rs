use super::config::StoreNodeConfig;
use super::peer::RemoteStore;
use super::types::FollowerStatus;
use dashmap::DashMap;
use rwsplit::WriteRequest;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    acked: u64,
    failed: u64,
}

/// Forwards accepted writes to follower nodes after a fixed lag.
///
/// Fire-and-forget: the accepting node answers its client before any
/// follower has the write, so readers on followers see it late or never.
pub struct FollowerFeed {
    node_id: String,
    lag: Duration,
    followers: Vec<Arc<RemoteStore>>,
    counters: Arc<DashMap<String, Counters>>,
}

impl FollowerFeed {
    pub fn new(config: &StoreNodeConfig, timeout: Duration) -> Arc<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let followers = config
            .followers
            .iter()
            .map(|f| {
                Arc::new(RemoteStore::with_client(
                    f.node_id.clone(),
                    f.addr.clone(),
                    timeout,
                    http_client.clone(),
                ))
            })
            .collect();

        Arc::new(Self {
            node_id: config.node_id.clone(),
            lag: Duration::from_millis(config.lag_ms),
            followers,
            counters: Arc::new(DashMap::new()),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn follower_count(&self) -> usize {
        self.followers.len()
    }

    pub fn lag(&self) -> Duration {
        self.lag
    }

    /// Spawn one delivery per follower and return without waiting.
    ///
    /// The handles are returned for callers that want to wait; dropping them
    /// does not cancel delivery.
    pub fn forward(&self, op: &WriteRequest) -> Vec<JoinHandle<()>> {
        self.followers
            .iter()
            .map(|follower| {
                let follower = Arc::clone(follower);
                let counters = Arc::clone(&self.counters);
                let origin = self.node_id.clone();
                let lag = self.lag;
                let op = op.clone();

                tokio::spawn(async move {
                    if !lag.is_zero() {
                        tokio::time::sleep(lag).await;
                    }
                    match follower.replicate(&origin, &op).await {
                        Ok(outcome) => {
                            counters.entry(follower.identity().to_string()).or_default().acked += 1;
                            tracing::info!(
                                "[FEED {}] follower {} applied {} on {} (affected={})",
                                origin,
                                follower.identity(),
                                op_name(&op),
                                op.table(),
                                outcome.affected
                            );
                        }
                        Err(e) => {
                            counters.entry(follower.identity().to_string()).or_default().failed += 1;
                            tracing::warn!(
                                "[FEED {}] failed to forward to follower {}: {}",
                                origin,
                                follower.identity(),
                                e
                            );
                        }
                    }
                })
            })
            .collect()
    }

    /// Delivery counters per follower, in configured order.
    pub fn status(&self) -> Vec<FollowerStatus> {
        self.followers
            .iter()
            .map(|f| {
                let c = self
                    .counters
                    .get(f.identity())
                    .map(|c| *c)
                    .unwrap_or_default();
                FollowerStatus {
                    node_id: f.identity().to_string(),
                    acked: c.acked,
                    failed: c.failed,
                }
            })
            .collect()
    }
}

fn op_name(op: &WriteRequest) -> &'static str {
    match op {
        WriteRequest::Insert { .. } => "insert",
        WriteRequest::Delete { .. } => "delete",
    }
}

#[cfg(test)]
mod tests {
    use super::super::config::FollowerConfig;
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(followers: Vec<FollowerConfig>, lag_ms: u64) -> StoreNodeConfig {
        StoreNodeConfig {
            node_id: "master".to_string(),
            bind_addr: "0.0.0.0:7800".to_string(),
            followers,
            lag_ms,
        }
    }

    fn delete(id: &str) -> WriteRequest {
        WriteRequest::Delete {
            table: "requests".into(),
            id: id.into(),
        }
    }

    #[test]
    fn test_feed_creation() {
        let feed = FollowerFeed::new(
            &config(
                vec![FollowerConfig {
                    node_id: "slave1".to_string(),
                    addr: "http://slave1:7800".to_string(),
                }],
                100,
            ),
            Duration::from_secs(1),
        );
        assert_eq!(feed.node_id(), "master");
        assert_eq!(feed.follower_count(), 1);
        assert_eq!(feed.lag(), Duration::from_millis(100));
        assert_eq!(feed.status()[0].acked, 0);
    }

    #[tokio::test]
    async fn test_no_followers_spawns_nothing() {
        let feed = FollowerFeed::new(&config(vec![], 0), Duration::from_secs(1));
        assert!(feed.forward(&delete("1")).is_empty());
    }

    #[tokio::test]
    async fn test_forward_counts_acks_and_failures() {
        let good = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/replicate"))
            .and(body_partial_json(json!({"origin": "master", "op": {"op": "delete"}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"node_id": "slave1", "affected": 1})),
            )
            .expect(2)
            .mount(&good)
            .await;
        let bad = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/replicate"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&bad)
            .await;

        let feed = FollowerFeed::new(
            &config(
                vec![
                    FollowerConfig {
                        node_id: "slave1".to_string(),
                        addr: good.uri(),
                    },
                    FollowerConfig {
                        node_id: "slave2".to_string(),
                        addr: bad.uri(),
                    },
                ],
                0,
            ),
            Duration::from_secs(2),
        );

        for id in ["1", "2"] {
            for handle in feed.forward(&delete(id)) {
                handle.await.unwrap();
            }
        }

        let status = feed.status();
        assert_eq!((status[0].acked, status[0].failed), (2, 0));
        assert_eq!((status[1].acked, status[1].failed), (0, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_waits_for_lag() {
        let feed = FollowerFeed::new(
            &config(
                vec![FollowerConfig {
                    node_id: "slave1".to_string(),
                    addr: "http://127.0.0.1:1".to_string(),
                }],
                5_000,
            ),
            Duration::from_secs(1),
        );

        let handles = feed.forward(&delete("1"));
        tokio::time::sleep(Duration::from_millis(4_000)).await;
        assert!(!handles[0].is_finished());
        assert_eq!(feed.status()[0].failed, 0);
    }
}
