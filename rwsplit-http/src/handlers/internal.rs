//! Store node routes. A store node is a [`MemoryStore`](rwsplit::store::MemoryStore)
//! exposed over HTTP for [`RemoteStore`](rwsplit_replication::RemoteStore)
//! clients; writes it accepts are forwarded to its followers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rwsplit::{ReadRequest, WriteRequest};
use rwsplit_replication::types::{
    ErrorBody, OnlineRequest, PingResponse, ReadResponse, ReplicateRequest, StoreStatus,
    TableStatus, WriteResponse,
};
use std::sync::Arc;

use super::StoreNodeState;

fn offline(state: &StoreNodeState) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorBody {
            error: format!("Store {} is offline", state.node_id),
            kind: "unreachable".to_string(),
        }),
    )
        .into_response()
}

/// Simulated round trip: configured latency, then the online switch.
async fn round_trip(state: &StoreNodeState) -> Result<(), Response> {
    let latency = state.store.latency();
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    if state.store.is_online() {
        Ok(())
    } else {
        Err(offline(state))
    }
}

/// GET /internal/ping
pub async fn ping(State(state): State<Arc<StoreNodeState>>) -> Response {
    if let Err(resp) = round_trip(&state).await {
        return resp;
    }
    Json(PingResponse {
        node_id: state.node_id.clone(),
        online: true,
    })
    .into_response()
}

/// POST /internal/write
/// Apply locally, then forward to followers without waiting for them.
pub async fn write(
    State(state): State<Arc<StoreNodeState>>,
    Json(req): Json<WriteRequest>,
) -> Response {
    if let Err(resp) = round_trip(&state).await {
        return resp;
    }
    let outcome = state.store.apply_write(&req);
    tracing::debug!(
        "[STORE {}] applied write on {} (affected={})",
        state.node_id,
        req.table(),
        outcome.affected
    );
    let _ = state.feed.forward(&req);

    Json(WriteResponse {
        node_id: state.node_id.clone(),
        affected: outcome.affected,
    })
    .into_response()
}

/// POST /internal/replicate
/// Apply a write forwarded by an upstream node. Never forwarded again.
pub async fn replicate(
    State(state): State<Arc<StoreNodeState>>,
    Json(req): Json<ReplicateRequest>,
) -> Response {
    if let Err(resp) = round_trip(&state).await {
        return resp;
    }
    let outcome = state.store.apply_write(&req.op);
    tracing::info!(
        "[STORE {}] applied replicated write on {} from {}",
        state.node_id,
        req.op.table(),
        req.origin
    );

    Json(WriteResponse {
        node_id: state.node_id.clone(),
        affected: outcome.affected,
    })
    .into_response()
}

/// POST /internal/read
pub async fn read(
    State(state): State<Arc<StoreNodeState>>,
    Json(req): Json<ReadRequest>,
) -> Response {
    if let Err(resp) = round_trip(&state).await {
        return resp;
    }
    Json(ReadResponse {
        node_id: state.node_id.clone(),
        result: state.store.apply_read(&req),
    })
    .into_response()
}

/// GET /internal/status
/// Answers even when the store is switched offline.
pub async fn status(State(state): State<Arc<StoreNodeState>>) -> Json<StoreStatus> {
    Json(store_status(&state))
}

/// POST /internal/online
pub async fn set_online(
    State(state): State<Arc<StoreNodeState>>,
    Json(req): Json<OnlineRequest>,
) -> Json<StoreStatus> {
    state.store.set_online(req.online);
    Json(store_status(&state))
}

fn store_status(state: &StoreNodeState) -> StoreStatus {
    StoreStatus {
        node_id: state.node_id.clone(),
        online: state.store.is_online(),
        writes_applied: state.store.writes_applied(),
        reads_served: state.store.reads_served(),
        followers: state.feed.status(),
        tables: state
            .store
            .table_names()
            .into_iter()
            .map(|name| TableStatus {
                rows: state.store.table_len(&name),
                name,
            })
            .collect(),
    }
}
