//! Connection lifecycle for one master and an ordered set of replicas.
//!
//! Startup connects every target through the configured [`RetryPolicy`].
//! A target that exhausts its budget is left not-live and startup carries on:
//! a dead replica only shrinks read capacity and a dead master only blocks
//! writes. After startup nothing runs on a timer; handles are re-probed
//! lazily when a caller is about to use them and the last probe is older
//! than `probe_interval_ms`.

use crate::clock::{Clock, MonotonicClock};
use crate::config::TopologyConfig;
use crate::error::{Result, StoreError};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::store::{DataStoreHandle, StoreConnection, StoreConnector};
use crate::types::Role;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct Supervisor {
    config: TopologyConfig,
    master: Arc<DataStoreHandle>,
    replicas: Vec<Arc<DataStoreHandle>>,
    connector: Arc<dyn StoreConnector>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    released: AtomicBool,
}

impl Supervisor {
    /// Connect master and replicas with bounded retries.
    ///
    /// Fails only on an invalid topology. Unreachable targets end up
    /// not-live instead.
    pub async fn initialize(
        config: TopologyConfig,
        connector: Arc<dyn StoreConnector>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let op_timeout = config.op_timeout();
        let master = Arc::new(DataStoreHandle::new(
            Role::Master,
            config.master.clone(),
            op_timeout,
        ));
        let replicas = config
            .replicas
            .iter()
            .map(|ep| Arc::new(DataStoreHandle::new(Role::Replica, ep.clone(), op_timeout)))
            .collect();

        let supervisor = Arc::new(Self {
            config,
            master,
            replicas,
            connector,
            clock,
            sleeper,
            released: AtomicBool::new(false),
        });

        let policy = supervisor.config.retry_policy();
        tracing::info!(
            "[SUPERVISOR] connecting master + {} replicas (max_attempts={}, retry_delay_ms={})",
            supervisor.replicas.len(),
            policy.max_attempts,
            supervisor.config.retry_delay_ms
        );

        join_all(
            supervisor
                .handles()
                .map(|handle| supervisor.connect_with_retry(handle, &policy)),
        )
        .await;

        let live_replicas = supervisor.live_replicas().len();
        if !supervisor.master.is_live() {
            tracing::error!(
                "[SUPERVISOR] master {} unreachable, writes are unavailable",
                supervisor.master.identity()
            );
        }
        if live_replicas == 0 && !supervisor.replicas.is_empty() {
            tracing::error!("[SUPERVISOR] no replica reachable, reads are unavailable");
        }
        tracing::info!(
            "[SUPERVISOR] initialized: master_live={}, live_replicas={}/{}",
            supervisor.master.is_live(),
            live_replicas,
            supervisor.replicas.len()
        );

        Ok(supervisor)
    }

    /// [`initialize`](Self::initialize) with the monotonic clock and tokio timer.
    pub async fn start(
        config: TopologyConfig,
        connector: Arc<dyn StoreConnector>,
    ) -> Result<Arc<Self>> {
        Self::initialize(
            config,
            connector,
            Arc::new(MonotonicClock::new()),
            Arc::new(TokioSleeper),
        )
        .await
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn server_id(&self) -> &str {
        &self.config.server_id
    }

    pub fn master(&self) -> &Arc<DataStoreHandle> {
        &self.master
    }

    /// Replicas in configured order.
    pub fn replicas(&self) -> &[Arc<DataStoreHandle>] {
        &self.replicas
    }

    pub fn live_replicas(&self) -> Vec<Arc<DataStoreHandle>> {
        self.replicas
            .iter()
            .filter(|h| h.is_live())
            .cloned()
            .collect()
    }

    /// Master first, then replicas.
    pub fn handles(&self) -> impl Iterator<Item = &Arc<DataStoreHandle>> {
        std::iter::once(&self.master).chain(self.replicas.iter())
    }

    pub fn find(&self, identity: &str) -> Option<&Arc<DataStoreHandle>> {
        self.handles().find(|h| h.identity() == identity)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.config.probe_interval_ms)
    }

    async fn connect_with_retry(&self, handle: &DataStoreHandle, policy: &RetryPolicy) {
        let result = policy
            .run(self.sleeper.as_ref(), |attempt| async move {
                match self.connect_once(handle).await {
                    Ok(conn) => Ok(conn),
                    Err(e) => {
                        tracing::warn!(
                            store = handle.identity(),
                            role = %handle.role(),
                            attempt,
                            max_attempts = policy.max_attempts,
                            "[SUPERVISOR] connect attempt {}/{} to {} failed: {}",
                            attempt,
                            policy.max_attempts,
                            handle.identity(),
                            e
                        );
                        Err(e)
                    }
                }
            })
            .await;

        match result {
            Ok(conn) => {
                handle.install(conn).await;
                handle.set_live(true);
                tracing::info!(
                    "[SUPERVISOR] {} {} connected after {} attempt(s)",
                    handle.role(),
                    handle.identity(),
                    handle.connect_attempts()
                );
            }
            Err(exhausted) => {
                handle.set_live(false);
                tracing::error!(
                    "[SUPERVISOR] {} {} marked down: {}",
                    handle.role(),
                    handle.identity(),
                    exhausted
                );
            }
        }
        handle.record_probe(self.clock.now_millis());
    }

    async fn connect_once(
        &self,
        handle: &DataStoreHandle,
    ) -> std::result::Result<Arc<dyn StoreConnection>, StoreError> {
        handle.record_connect_attempt();
        let timeout = handle.op_timeout();
        match tokio::time::timeout(timeout, self.connector.connect(handle.endpoint())).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                identity: handle.identity().to_string(),
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Liveness round trip; reconnects once first if the handle has no
    /// connection. Updates `live` and the probe timestamp. Always `false`
    /// after [`shutdown`](Self::shutdown).
    pub async fn probe(&self, handle: &DataStoreHandle) -> bool {
        if self.is_shut_down() {
            return false;
        }
        let outcome = match handle.connection().await {
            Some(conn) => self.ping(handle, conn).await,
            None => match self.connect_once(handle).await {
                Ok(conn) => {
                    handle.install(Arc::clone(&conn)).await;
                    self.ping(handle, conn).await
                }
                Err(e) => Err(e),
            },
        };

        // shutdown raced with this probe: drop whatever it installed
        if self.is_shut_down() {
            self.release(handle).await;
            return false;
        }

        let live = outcome.is_ok();
        let was_live = handle.set_live(live);
        handle.record_probe(self.clock.now_millis());

        match outcome {
            Ok(()) if !was_live => {
                tracing::info!("[SUPERVISOR] {} {} is back up", handle.role(), handle.identity());
            }
            Err(e) => {
                if let Some(conn) = handle.take_connection().await {
                    let _ = tokio::time::timeout(handle.op_timeout(), conn.close()).await;
                }
                if was_live {
                    tracing::warn!(
                        "[SUPERVISOR] {} {} failed probe: {}",
                        handle.role(),
                        handle.identity(),
                        e
                    );
                } else {
                    tracing::debug!(
                        "[SUPERVISOR] {} {} still down: {}",
                        handle.role(),
                        handle.identity(),
                        e
                    );
                }
            }
            Ok(()) => {}
        }

        live
    }

    async fn ping(
        &self,
        handle: &DataStoreHandle,
        conn: Arc<dyn StoreConnection>,
    ) -> std::result::Result<(), StoreError> {
        let timeout = handle.op_timeout();
        match tokio::time::timeout(timeout, conn.ping()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                identity: handle.identity().to_string(),
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Probe only if the last probe is older than the probe interval.
    ///
    /// When another caller is already probing this handle, returns the
    /// current flag instead of probing twice.
    pub async fn probe_if_stale(&self, handle: &DataStoreHandle) -> bool {
        if !handle.is_stale(self.clock.now_millis(), self.probe_interval()) {
            return handle.is_live();
        }
        let Some(_guard) = handle.try_begin_probe() else {
            return handle.is_live();
        };
        self.probe(handle).await
    }

    /// Lazily re-probe every stale replica, concurrently.
    pub async fn refresh_replicas(&self) {
        let now = self.clock.now_millis();
        let interval = self.probe_interval();
        let stale: Vec<&Arc<DataStoreHandle>> = self
            .replicas
            .iter()
            .filter(|h| h.is_stale(now, interval))
            .collect();
        if stale.is_empty() {
            return;
        }
        join_all(stale.into_iter().map(|h| self.probe_if_stale(h))).await;
    }

    /// Close the handle's connection, live or not.
    pub async fn release(&self, handle: &DataStoreHandle) {
        handle.set_live(false);
        match handle.take_connection().await {
            Some(conn) => {
                match tokio::time::timeout(handle.op_timeout(), conn.close()).await {
                    Ok(Ok(())) => {
                        tracing::info!("[SUPERVISOR] released {} {}", handle.role(), handle.identity())
                    }
                    Ok(Err(e)) => tracing::warn!(
                        "[SUPERVISOR] error closing {}: {}",
                        handle.identity(),
                        e
                    ),
                    Err(_) => tracing::warn!(
                        "[SUPERVISOR] timed out closing {}",
                        handle.identity()
                    ),
                }
            }
            None => tracing::debug!(
                "[SUPERVISOR] released {} {} (no open connection)",
                handle.role(),
                handle.identity()
            ),
        }
    }

    /// Release every handle once. Later calls are no-ops.
    pub async fn shutdown(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("[SUPERVISOR] shutting down, releasing {} handles", self.replicas.len() + 1);
        for handle in self.handles() {
            self.release(handle).await;
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}
