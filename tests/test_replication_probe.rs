/// Replication probe outcomes with caller-supplied write and read functions
mod common;

use common::Cluster;
use rwsplit::reporter::{ProbeWrite, PROBE_TABLE};
use rwsplit::{
    ReadRequest, ReadResult, Record, Reporter, Router, RoutingError, StoreError, WriteOutcome,
    WriteRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

async fn reporter(cluster: &Cluster) -> Reporter {
    Reporter::new(Arc::new(Router::new(cluster.start().await)))
}

fn probe_row(id: &str) -> Record {
    Record::with_id(id, serde_json::Map::new())
}

#[tokio::test]
async fn test_write_succeeds_but_no_replica_sees_it() {
    let cluster = Cluster::new(&["slave1", "slave2"]);
    let reporter = reporter(&cluster).await;

    let probe = reporter
        .probe_replication_with(
            |master, id| async move {
                master
                    .write(&WriteRequest::Insert {
                        table: PROBE_TABLE.into(),
                        record: probe_row(&id),
                    })
                    .await
            },
            |_replica, _id| async move { Ok(None) },
        )
        .await;

    assert_eq!(
        probe.write_outcome,
        ProbeWrite::Succeeded { served_by: "master".into() }
    );
    assert_eq!(probe.per_replica.len(), 2);
    assert!(probe.per_replica.iter().all(|o| !o.found && o.error.is_none()));
    assert_eq!(probe.found_count(), 0);
    assert!(!probe.fully_propagated());
    assert_eq!(cluster.master.table_len(PROBE_TABLE), 1);
    // default settle interval
    assert_eq!(cluster.sleeper.requested(), vec![Duration::from_millis(2_000)]);
}

#[tokio::test]
async fn test_every_replica_observes_the_row() {
    let cluster = Cluster::new(&["slave1", "slave2", "slave3"]);
    let reporter = reporter(&cluster).await;

    let probe = reporter
        .probe_replication_with(
            |_master, _id| async move { Ok(WriteOutcome { affected: 1 }) },
            |_replica, id| async move { Ok(Some(probe_row(&id))) },
        )
        .await;

    assert!(probe.fully_propagated());
    assert_eq!(probe.found_count(), 3);
    for obs in &probe.per_replica {
        assert_eq!(
            obs.observed_row.as_ref().map(|r| r.id.as_str()),
            Some(probe.correlation_id.as_str())
        );
    }
}

#[tokio::test]
async fn test_replicated_row_is_read_from_each_replica() {
    let cluster = Cluster::new(&["slave1", "slave2"]);
    let reporter = reporter(&cluster).await;

    // copy the row to slave1 only, standing in for external replication
    let slave1 = Arc::clone(cluster.replica("slave1"));
    let probe = reporter
        .probe_replication_with(
            move |master, id| async move {
                let req = WriteRequest::Insert {
                    table: PROBE_TABLE.into(),
                    record: probe_row(&id),
                };
                let outcome = master.write(&req).await;
                if outcome.is_ok() {
                    slave1.apply_write(&req);
                }
                outcome
            },
            |replica, id| async move {
                let req = ReadRequest::Get { table: PROBE_TABLE.into(), id };
                match replica.read(&req).await {
                    Ok(ReadResult::Record(row)) => Ok(row),
                    Ok(_) => Ok(None),
                    Err(e) => Err(e),
                }
            },
        )
        .await;

    let found: Vec<(&str, bool)> = probe
        .per_replica
        .iter()
        .map(|o| (o.identity.as_str(), o.found))
        .collect();
    assert_eq!(found, vec![("slave1", true), ("slave2", false)]);
}

#[tokio::test]
async fn test_read_error_on_one_replica_is_reported_inline() {
    let cluster = Cluster::new(&["slave1", "slave2"]);
    let reporter = reporter(&cluster).await;

    let probe = reporter
        .probe_replication_with(
            |_master, _id| async move { Ok(WriteOutcome { affected: 1 }) },
            |replica, id| async move {
                if replica.identity() == "slave2" {
                    Err(RoutingError::OperationFailure {
                        identity: "slave2".into(),
                        source: StoreError::Unreachable("slave2".into()),
                    })
                } else {
                    Ok(Some(probe_row(&id)))
                }
            },
        )
        .await;

    assert!(probe.per_replica[0].found);
    assert!(!probe.per_replica[1].found);
    assert!(probe.per_replica[1]
        .error
        .as_deref()
        .unwrap()
        .contains("slave2"));
    assert!(!probe.fully_propagated());
}

#[tokio::test]
async fn test_failed_write_skips_reads() {
    let cluster = Cluster::new(&["slave1"]);
    let reporter = reporter(&cluster).await;
    let reads = AtomicUsize::new(0);

    let probe = reporter
        .probe_replication_with(
            |_master, _id| async move {
                Err(RoutingError::OperationFailure {
                    identity: "master".into(),
                    source: StoreError::Rejected {
                        identity: "master".into(),
                        reason: "read-only".into(),
                    },
                })
            },
            |_replica, _id| {
                reads.fetch_add(1, Ordering::SeqCst);
                async move { Ok(None) }
            },
        )
        .await;

    assert!(matches!(probe.write_outcome, ProbeWrite::Failed { .. }));
    assert_eq!(probe.settle_delay_ms, 0);
    assert_eq!(reads.load(Ordering::SeqCst), 0);
    assert!(cluster.sleeper.requested().is_empty());
    assert_eq!(
        probe.per_replica[0].error.as_deref(),
        Some("skipped: probe write failed")
    );
}

#[tokio::test]
async fn test_snapshot_tracks_probe_outcomes() {
    let cluster = Cluster::new(&["slave1", "slave2"]);
    let sup = cluster.start().await;
    let reporter = Reporter::new(Arc::new(Router::new(Arc::clone(&sup))));
    assert_eq!(reporter.snapshot().live_replicas, 2);

    cluster.replica("slave2").set_online(false);
    // snapshot never probes
    assert_eq!(reporter.snapshot().live_replicas, 2);

    cluster.clock.advance(1_000);
    sup.refresh_replicas().await;
    let report = reporter.snapshot();
    assert_eq!(report.live_replicas, 1);
    assert_eq!(report.status, rwsplit::HealthStatus::Degraded);
    assert_eq!(report.replicas[1].last_probe_ms, Some(2_000));
}
