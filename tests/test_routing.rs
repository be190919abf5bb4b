/// Read/write splitting and round-robin selection through the public API
mod common;

use common::Cluster;
use rwsplit::{
    Operation, ReadRequest, Record, ReplicaSelector, Router, RoutingError, WriteRequest,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn read() -> Operation {
    Operation::Read(ReadRequest::List {
        table: "requests".into(),
        limit: 5,
    })
}

fn write(id: &str) -> Operation {
    Operation::Write(WriteRequest::Insert {
        table: "requests".into(),
        record: Record::from_json(id, json!({"server_id": "app1"})).unwrap(),
    })
}

async fn served_by(router: &Router, n: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(router.route(&read()).await.unwrap().identity().to_string());
    }
    out
}

#[tokio::test]
async fn test_seven_reads_cycle_three_replicas() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    let router = Router::new(cluster.start().await);

    assert_eq!(
        served_by(&router, 7).await,
        vec!["a", "b", "c", "a", "b", "c", "a"]
    );
}

#[tokio::test]
async fn test_one_of_two_replicas_down_at_startup() {
    let cluster = Cluster::new(&["r1", "r2"]);
    cluster.replica("r2").set_online(false);
    let sup = cluster.start().await;
    assert!(sup.master().is_live());
    assert!(!sup.replicas()[1].is_live());

    let router = Router::new(sup);
    assert_eq!(served_by(&router, 4).await, vec!["r1"; 4]);
}

#[tokio::test]
async fn test_replica_going_down_is_skipped_after_probe() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    let sup = cluster.start().await;
    let router = Router::new(Arc::clone(&sup));
    assert_eq!(served_by(&router, 2).await, vec!["a", "b"]);

    cluster.replica("b").set_online(false);
    cluster.clock.advance(1_000);
    assert_eq!(served_by(&router, 4).await, vec!["a", "c", "a", "c"]);
    assert!(!sup.find("b").unwrap().is_live());
}

#[tokio::test]
async fn test_recovered_replica_rejoins_in_place() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    cluster.replica("a").set_online(false);
    let router = Router::new(cluster.start().await);
    assert_eq!(served_by(&router, 2).await, vec!["b", "c"]);

    // not yet stale: still excluded
    cluster.replica("a").set_online(true);
    assert_eq!(served_by(&router, 1).await, vec!["b"]);

    cluster.clock.advance(1_000);
    // cursor=3 over [a, b, c]
    assert_eq!(served_by(&router, 3).await, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_write_never_falls_back_to_replica() {
    let cluster = Cluster::new(&["slave1", "slave2"]);
    cluster.master.set_online(false);
    let router = Router::new(cluster.start().await);

    for i in 0..3 {
        let err = router.execute(write(&i.to_string())).await.unwrap_err();
        assert_eq!(err, RoutingError::MasterUnavailable("master".into()));
    }
    assert_eq!(cluster.replica("slave1").writes_applied(), 0);
    assert_eq!(cluster.replica("slave2").writes_applied(), 0);

    // reads keep working off the replicas
    assert!(router.execute(read()).await.is_ok());
}

#[tokio::test]
async fn test_read_never_falls_back_to_master() {
    let cluster = Cluster::new(&["slave1"]);
    cluster.replica("slave1").set_online(false);
    let router = Router::new(cluster.start().await);

    let err = router.execute(read()).await.unwrap_err();
    assert_eq!(err, RoutingError::NoReplicaAvailable);
    assert_eq!(cluster.master.reads_served(), 0);

    // writes keep working off the master
    router.execute(write("1")).await.unwrap();
    assert_eq!(cluster.master.table_len("requests"), 1);
}

#[tokio::test]
async fn test_replica_failure_mid_read_is_surfaced_not_retried() {
    let cluster = Cluster::new(&["a", "b"]);
    let router = Router::new(cluster.start().await);

    cluster.replica("a").set_online(false);
    let err = router.execute(read()).await.unwrap_err();
    assert!(matches!(err, RoutingError::OperationFailure { ref identity, .. } if identity == "a"));
    assert!(err.is_retryable());
    assert_eq!(cluster.replica("b").reads_served(), 0);

    // "a" was marked stale by the failure; it is re-probed (still down) and skipped
    let out = router.execute(read()).await.unwrap();
    assert_eq!(out.served_by, "b");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_selection_uses_every_ticket_once() {
    const TASKS: usize = 8;
    const PER_TASK: usize = 300;
    let cluster = Cluster::new(&["a", "b", "c"]);
    let sup = cluster.start().await;
    let selector = Arc::new(ReplicaSelector::new());

    let mut tasks = Vec::new();
    for _ in 0..TASKS {
        let selector = Arc::clone(&selector);
        let sup = Arc::clone(&sup);
        tasks.push(tokio::spawn(async move {
            let mut picks = Vec::with_capacity(PER_TASK);
            for _ in 0..PER_TASK {
                picks.push(selector.next(sup.replicas()).unwrap().identity().to_string());
            }
            picks
        }));
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for task in tasks {
        for id in task.await.unwrap() {
            *counts.entry(id).or_default() += 1;
        }
    }

    let total = TASKS * PER_TASK;
    assert_eq!(selector.cursor(), total as u64);
    // 2400 distinct tickets over 3 replicas: exactly 800 each
    for name in ["a", "b", "c"] {
        assert_eq!(counts[name], total / 3, "replica {}", name);
    }
}
