use rwsplit::clock::ManualClock;
use rwsplit::retry::NoopSleeper;
use rwsplit::store::{MemoryConnector, MemoryStore, StoreConnector};
use rwsplit::{StoreEndpoint, Supervisor, TopologyConfig};
use std::sync::Arc;

/// A master and named replicas backed by memory stores, with a manual clock
/// and a sleeper that never waits.
pub struct Cluster {
    pub connector: Arc<MemoryConnector>,
    pub master: Arc<MemoryStore>,
    pub replicas: Vec<Arc<MemoryStore>>,
    pub clock: Arc<ManualClock>,
    pub sleeper: Arc<NoopSleeper>,
}

#[allow(dead_code)]
impl Cluster {
    pub fn new(replicas: &[&str]) -> Self {
        let connector = Arc::new(MemoryConnector::new());
        let master = MemoryStore::new("master");
        connector.register(Arc::clone(&master));
        let replicas = replicas
            .iter()
            .map(|name| {
                let store = MemoryStore::new(*name);
                connector.register(Arc::clone(&store));
                store
            })
            .collect();

        Self {
            connector,
            master,
            replicas,
            clock: Arc::new(ManualClock::new(1_000)),
            sleeper: Arc::new(NoopSleeper::new()),
        }
    }

    /// Three connect attempts, no retry delay, 1s probe interval.
    pub fn topology(&self) -> TopologyConfig {
        let mut config = TopologyConfig::new(
            "app1",
            StoreEndpoint::new("master", "memory://master"),
            self.replicas
                .iter()
                .map(|r| StoreEndpoint::new(r.name(), format!("memory://{}", r.name())))
                .collect(),
        );
        config.max_connect_attempts = 3;
        config.retry_delay_ms = 0;
        config.probe_interval_ms = 1_000;
        config
    }

    pub fn replica(&self, name: &str) -> &Arc<MemoryStore> {
        self.replicas
            .iter()
            .find(|r| r.name() == name)
            .unwrap_or_else(|| panic!("no replica {}", name))
    }

    pub async fn start(&self) -> Arc<Supervisor> {
        self.start_with(self.topology()).await
    }

    pub async fn start_with(&self, config: TopologyConfig) -> Arc<Supervisor> {
        self.start_with_connector(config, self.connector.clone()).await
    }

    pub async fn start_with_connector(
        &self,
        config: TopologyConfig,
        connector: Arc<dyn StoreConnector>,
    ) -> Arc<Supervisor> {
        Supervisor::initialize(config, connector, self.clock.clone(), self.sleeper.clone())
            .await
            .unwrap()
    }
}
