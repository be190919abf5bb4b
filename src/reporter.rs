//! Health snapshots and the synthetic replication probe.
//!
//! The probe writes one tagged row through the router, waits for the settle
//! interval, then reads that row back from every live replica. It is purely
//! observational: the normal read path hides divergence between replicas,
//! this surfaces it. Nothing here feeds back into routing.

use crate::error::RoutingError;
use crate::router::Router;
use crate::store::DataStoreHandle;
use crate::types::{Operation, ReadRequest, ReadResult, Record, Role, WriteOutcome, WriteRequest};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Table the default replication probe writes into.
pub const PROBE_TABLE: &str = "replication_probe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Master and every replica live.
    Healthy,
    /// Something is down but something still serves.
    Degraded,
    /// Nothing is live.
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHealth {
    pub identity: String,
    pub role: Role,
    pub live: bool,
    /// Supervisor clock reading (millis since process start in production).
    pub last_probe_ms: Option<u64>,
    pub connect_attempts: u32,
}

impl StoreHealth {
    fn of(handle: &DataStoreHandle) -> Self {
        Self {
            identity: handle.identity().to_string(),
            role: handle.role(),
            live: handle.is_live(),
            last_probe_ms: handle.last_probe_ms(),
            connect_attempts: handle.connect_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub master_live: bool,
    pub master: StoreHealth,
    pub replicas: Vec<StoreHealth>,
    pub live_replicas: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeWrite {
    Succeeded { served_by: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaObservation {
    pub identity: String,
    pub found: bool,
    pub observed_row: Option<Record>,
    /// Why the replica was not read, or why the read failed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationProbe {
    pub correlation_id: String,
    pub write_outcome: ProbeWrite,
    pub settle_delay_ms: u64,
    pub per_replica: Vec<ReplicaObservation>,
}

impl ReplicationProbe {
    pub fn found_count(&self) -> usize {
        self.per_replica.iter().filter(|o| o.found).count()
    }

    /// True when the write succeeded and every replica returned the row.
    pub fn fully_propagated(&self) -> bool {
        matches!(self.write_outcome, ProbeWrite::Succeeded { .. })
            && !self.per_replica.is_empty()
            && self.per_replica.iter().all(|o| o.found)
    }
}

pub struct Reporter {
    router: Arc<Router>,
}

impl Reporter {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    /// Liveness as of the last probe. Never probes.
    pub fn snapshot(&self) -> HealthReport {
        let supervisor = self.router.supervisor();
        let master = StoreHealth::of(supervisor.master());
        let replicas: Vec<StoreHealth> = supervisor
            .replicas()
            .iter()
            .map(|h| StoreHealth::of(h))
            .collect();
        let live_replicas = replicas.iter().filter(|r| r.live).count();

        let status = if master.live && live_replicas == replicas.len() {
            HealthStatus::Healthy
        } else if master.live || live_replicas > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Down
        };

        HealthReport {
            status,
            master_live: master.live,
            master,
            replicas,
            live_replicas,
        }
    }

    /// Probe using the built-in probe table.
    pub async fn probe_replication(&self) -> ReplicationProbe {
        let server_id = self.router.supervisor().server_id().to_string();
        self.probe_replication_with(
            move |master, correlation_id| async move {
                let mut fields = serde_json::Map::new();
                fields.insert("server_id".into(), server_id.into());
                fields.insert("probe".into(), true.into());
                let req = WriteRequest::Insert {
                    table: PROBE_TABLE.to_string(),
                    record: Record::with_id(correlation_id, fields),
                };
                master.write(&req).await
            },
            |replica, correlation_id| async move {
                let req = ReadRequest::Get {
                    table: PROBE_TABLE.to_string(),
                    id: correlation_id,
                };
                match replica.read(&req).await {
                    Ok(ReadResult::Record(row)) => Ok(row),
                    Ok(_) => Ok(None),
                    Err(e) => Err(e),
                }
            },
        )
        .await
    }

    /// Write once through the router, settle, then read from every live replica.
    ///
    /// `write_fn` receives the master handle and the correlation id;
    /// `read_fn` receives one replica handle and the correlation id and
    /// returns the matching row, if any. Never fails: every problem is
    /// reported inside the probe.
    pub async fn probe_replication_with<W, WF, R, RF>(
        &self,
        write_fn: W,
        read_fn: R,
    ) -> ReplicationProbe
    where
        W: FnOnce(Arc<DataStoreHandle>, String) -> WF,
        WF: Future<Output = Result<WriteOutcome, RoutingError>>,
        R: Fn(Arc<DataStoreHandle>, String) -> RF,
        RF: Future<Output = Result<Option<Record>, RoutingError>>,
    {
        let supervisor = self.router.supervisor();
        let settle = supervisor.config().settle_delay();
        let correlation_id = uuid::Uuid::new_v4().to_string();

        let routing_op = Operation::Write(WriteRequest::Insert {
            table: PROBE_TABLE.to_string(),
            record: Record::with_id(correlation_id.clone(), serde_json::Map::new()),
        });

        let write_outcome = match self.router.route(&routing_op).await {
            Ok(master) => {
                let served_by = master.identity().to_string();
                match write_fn(master, correlation_id.clone()).await {
                    Ok(_) => ProbeWrite::Succeeded { served_by },
                    Err(e) => ProbeWrite::Failed {
                        error: e.to_string(),
                    },
                }
            }
            Err(e) => ProbeWrite::Failed {
                error: e.to_string(),
            },
        };

        if let ProbeWrite::Failed { error } = &write_outcome {
            tracing::warn!("[PROBE {}] write failed, skipping reads: {}", correlation_id, error);
            let per_replica = supervisor
                .replicas()
                .iter()
                .map(|h| skipped(h, "probe write failed"))
                .collect();
            return ReplicationProbe {
                correlation_id,
                write_outcome,
                settle_delay_ms: 0,
                per_replica,
            };
        }

        if !settle.is_zero() {
            supervisor.sleeper().sleep(settle).await;
        }

        supervisor.refresh_replicas().await;

        let reads = supervisor.replicas().iter().map(|handle| {
            let read_fn = &read_fn;
            let correlation_id = correlation_id.clone();
            async move {
                if !handle.is_live() {
                    return skipped(handle, "replica not live");
                }
                match read_fn(Arc::clone(handle), correlation_id).await {
                    Ok(row) => ReplicaObservation {
                        identity: handle.identity().to_string(),
                        found: row.is_some(),
                        observed_row: row,
                        error: None,
                    },
                    Err(e) => ReplicaObservation {
                        identity: handle.identity().to_string(),
                        found: false,
                        observed_row: None,
                        error: Some(e.to_string()),
                    },
                }
            }
        });
        let per_replica = join_all(reads).await;

        let probe = ReplicationProbe {
            correlation_id,
            write_outcome,
            settle_delay_ms: settle.as_millis() as u64,
            per_replica,
        };
        tracing::info!(
            "[PROBE {}] {}/{} replicas observed the write",
            probe.correlation_id,
            probe.found_count(),
            probe.per_replica.len()
        );
        probe
    }
}

fn skipped(handle: &DataStoreHandle, reason: &str) -> ReplicaObservation {
    ReplicaObservation {
        identity: handle.identity().to_string(),
        found: false,
        observed_row: None,
        error: Some(format!("skipped: {}", reason)),
    }
}
