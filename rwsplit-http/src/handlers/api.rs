use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header::USER_AGENT, HeaderMap},
    Json,
};
use rwsplit::{
    Operation, OperationResult, ReadRequest, ReadResult, Record, RwSplitError, WriteRequest,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::{routing_error, ApiError, AppState};

/// Table every application instance logs its requests into.
pub const REQUESTS_TABLE: &str = "requests";

const DEFAULT_REQUESTS_LIMIT: usize = 10;
const MAX_REQUESTS_LIMIT: usize = 100;

/// GET /api/
///
/// Banner that touches no store; shows which instance the balancer picked.
pub async fn banner(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    Json(serde_json::json!({
        "message": "Hello from the read/write splitting demo",
        "server_id": state.server_id,
        "hostname": hostname,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /api/server-info
///
/// Logs the request through the master, then reports which instance answered.
pub async fn server_info(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let client_ip = client_ip(&headers, connect_info.as_ref().map(|c| &c.0));
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut fields = serde_json::Map::new();
    fields.insert("server_id".into(), state.server_id.clone().into());
    fields.insert("client_ip".into(), client_ip.clone().into());
    fields.insert("user_agent".into(), user_agent.into());

    let op = Operation::Write(WriteRequest::Insert {
        table: REQUESTS_TABLE.to_string(),
        record: Record::new(fields),
    });
    let out = state
        .router
        .execute(op)
        .await
        .map_err(|e| routing_error(&state, e))?;

    Ok(Json(serde_json::json!({
        "server_id": state.server_id,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "message": format!("Request handled by Server {}", state.server_id),
        "client_ip": client_ip,
        "database_status": "connected",
        "written_to": out.served_by,
    })))
}

/// GET /api/stats
///
/// Requests per application instance, counted on a replica.
pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let op = Operation::Read(ReadRequest::CountBy {
        table: REQUESTS_TABLE.to_string(),
        field: "server_id".to_string(),
    });
    let out = state
        .router
        .execute(op)
        .await
        .map_err(|e| routing_error(&state, e))?;

    let counts = match out.result {
        OperationResult::Read(ReadResult::Counts(counts)) => counts,
        other => return Err(unexpected(&state, other)),
    };

    let total: u64 = counts.iter().map(|c| c.count).sum();
    let statistics: Vec<serde_json::Value> = counts
        .into_iter()
        .map(|c| serde_json::json!({"server_id": c.key, "request_count": c.count}))
        .collect();

    Ok(Json(serde_json::json!({
        "server_id": state.server_id,
        "served_by": out.served_by,
        "statistics": statistics,
        "total_requests": total,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RequestsQuery {
    pub limit: Option<usize>,
}

/// GET /api/requests?limit=N
///
/// Most recent logged requests, newest first, read from a replica.
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RequestsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = match query.limit {
        Some(0) => {
            return Err(ApiError::new(
                &state.server_id,
                RwSplitError::InvalidRequest("limit must be at least 1".into()),
            ))
        }
        Some(n) => n.min(MAX_REQUESTS_LIMIT),
        None => DEFAULT_REQUESTS_LIMIT,
    };

    let op = Operation::Read(ReadRequest::List {
        table: REQUESTS_TABLE.to_string(),
        limit,
    });
    let out = state
        .router
        .execute(op)
        .await
        .map_err(|e| routing_error(&state, e))?;

    let requests = match out.result {
        OperationResult::Read(ReadResult::Records(records)) => records,
        other => return Err(unexpected(&state, other)),
    };

    Ok(Json(serde_json::json!({
        "server_id": state.server_id,
        "served_by": out.served_by,
        "count": requests.len(),
        "requests": requests,
    })))
}

fn unexpected(state: &AppState, result: OperationResult) -> ApiError {
    ApiError::new(
        &state.server_id,
        RwSplitError::OperationFailure {
            identity: state.server_id.clone(),
            reason: format!("unexpected store result: {:?}", result),
        },
    )
}

/// First hop of `X-Forwarded-For` when behind a proxy, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<&SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
