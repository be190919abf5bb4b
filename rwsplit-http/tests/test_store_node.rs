/// Store node routes, and an application server talking to real store nodes
/// over HTTP.
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use rwsplit::clock::ManualClock;
use rwsplit::retry::NoopSleeper;
use rwsplit::store::MemoryStore;
use rwsplit::{
    Operation, ReadRequest, ReadResult, Record, Router, StoreEndpoint, Supervisor,
    TopologyConfig, WriteRequest,
};
use rwsplit_http::handlers::StoreNodeState;
use rwsplit_http::server::http_connector;
use rwsplit_http::store_router;
use rwsplit_replication::{FollowerConfig, FollowerFeed, StoreNodeConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn node_state(node_id: &str, followers: Vec<FollowerConfig>) -> Arc<StoreNodeState> {
    let config = StoreNodeConfig {
        node_id: node_id.to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        followers,
        lag_ms: 0,
    };
    Arc::new(StoreNodeState {
        node_id: node_id.to_string(),
        store: MemoryStore::new(node_id),
        feed: FollowerFeed::new(&config, Duration::from_secs(2)),
    })
}

/// Serve a node on an ephemeral port and return its base URL.
async fn spawn_node(state: Arc<StoreNodeState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = store_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn call(state: &Arc<StoreNodeState>, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(if body.is_null() {
            Body::empty()
        } else {
            Body::from(body.to_string())
        })
        .unwrap();
    let response = store_router(Arc::clone(state)).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

fn insert(id: &str, server_id: &str) -> WriteRequest {
    WriteRequest::Insert {
        table: "requests".into(),
        record: Record::from_json(id, json!({"server_id": server_id})).unwrap(),
    }
}

#[tokio::test]
async fn test_ping_and_offline_switch() {
    let state = node_state("slave1", vec![]);

    let (status, body) = call(&state, "GET", "/internal/ping", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node_id"], "slave1");
    assert_eq!(body["online"], true);

    let (status, body) = call(&state, "POST", "/internal/online", json!({"online": false})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], false);

    let (status, body) = call(&state, "GET", "/internal/ping", Value::Null).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "unreachable");

    // status stays readable while offline
    let (status, body) = call(&state, "GET", "/internal/status", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], false);
}

#[tokio::test]
async fn test_write_then_read_on_node() {
    let state = node_state("master", vec![]);
    let write = serde_json::to_value(insert("1", "app1")).unwrap();

    let (status, body) = call(&state, "POST", "/internal/write", write).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affected"], 1);

    let read = serde_json::to_value(ReadRequest::Get {
        table: "requests".into(),
        id: "1".into(),
    })
    .unwrap();
    let (status, body) = call(&state, "POST", "/internal/read", read).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["kind"], "record");
    assert_eq!(body["result"]["value"]["fields"]["server_id"], "app1");

    let (_, body) = call(&state, "GET", "/internal/status", Value::Null).await;
    assert_eq!(body["writes_applied"], 1);
    assert_eq!(body["tables"], json!([{"name": "requests", "rows": 1}]));
}

#[tokio::test]
async fn test_malformed_write_is_rejected() {
    let state = node_state("master", vec![]);
    let (status, _) = call(&state, "POST", "/internal/write", json!({"op": "truncate"})).await;
    assert!(status.is_client_error());
    assert_eq!(state.store.writes_applied(), 0);
}

#[tokio::test]
async fn test_master_forwards_writes_to_followers() {
    let slave1 = node_state("slave1", vec![]);
    let slave1_url = spawn_node(Arc::clone(&slave1)).await;
    let master = node_state(
        "master",
        vec![FollowerConfig {
            node_id: "slave1".into(),
            addr: slave1_url,
        }],
    );

    let write = serde_json::to_value(insert("42", "app1")).unwrap();
    let (status, _) = call(&master, "POST", "/internal/write", write).await;
    assert_eq!(status, StatusCode::OK);

    assert!(wait_for(|| slave1.store.table_len("requests") == 1).await);
    assert!(wait_for(|| master.feed.status()[0].acked == 1).await);
}

#[tokio::test]
async fn test_app_routes_over_http_nodes() {
    let slave1 = node_state("slave1", vec![]);
    let slave2 = node_state("slave2", vec![]);
    let slave1_url = spawn_node(Arc::clone(&slave1)).await;
    let slave2_url = spawn_node(Arc::clone(&slave2)).await;
    let master = node_state(
        "master",
        vec![
            FollowerConfig {
                node_id: "slave1".into(),
                addr: slave1_url.clone(),
            },
            FollowerConfig {
                node_id: "slave2".into(),
                addr: slave2_url.clone(),
            },
        ],
    );
    let master_url = spawn_node(Arc::clone(&master)).await;

    let mut config = TopologyConfig::new(
        "app1",
        StoreEndpoint::new("master", master_url),
        vec![
            StoreEndpoint::new("slave1", slave1_url),
            StoreEndpoint::new("slave2", slave2_url),
        ],
    );
    config.max_connect_attempts = 2;
    config.retry_delay_ms = 0;
    config.probe_interval_ms = 1_000;
    config.op_timeout_ms = 2_000;

    let clock = Arc::new(ManualClock::new(1_000));
    let supervisor = Supervisor::initialize(
        config,
        http_connector(Duration::from_secs(2)),
        clock.clone(),
        Arc::new(NoopSleeper::new()),
    )
    .await
    .unwrap();
    assert!(supervisor.handles().all(|h| h.is_live()));
    let router = Router::new(Arc::clone(&supervisor));

    let out = router
        .execute(Operation::Write(insert("1", "app1")))
        .await
        .unwrap();
    assert_eq!(out.served_by, "master");
    assert!(wait_for(|| slave1.store.table_len("requests") == 1
        && slave2.store.table_len("requests") == 1)
    .await);

    let count_by = || {
        Operation::Read(ReadRequest::CountBy {
            table: "requests".into(),
            field: "server_id".into(),
        })
    };
    let first = router.execute(count_by()).await.unwrap();
    let second = router.execute(count_by()).await.unwrap();
    assert_eq!(first.served_by, "slave1");
    assert_eq!(second.served_by, "slave2");
    assert_eq!(master.store.reads_served(), 0);

    // take slave2 offline; after the probe interval it is skipped
    slave2.store.set_online(false);
    clock.advance(1_000);
    for _ in 0..3 {
        let out = router.execute(count_by()).await.unwrap();
        assert_eq!(out.served_by, "slave1");
        match out.result {
            rwsplit::OperationResult::Read(ReadResult::Counts(counts)) => {
                assert_eq!(counts[0].count, 1)
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert!(!supervisor.find("slave2").unwrap().is_live());

    supervisor.shutdown().await;
}
