use axum::{extract::State, Json};
use rwsplit::{HealthReport, ReplicationProbe};
use std::sync::Arc;

use super::AppState;

/// GET /api/replication/status
pub async fn replication_status(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.reporter.snapshot())
}

/// POST /api/replication/probe
///
/// Blocks for the settle interval. Probe failures are reported in the body,
/// never as an error status.
pub async fn probe_replication(State(state): State<Arc<AppState>>) -> Json<ReplicationProbe> {
    Json(state.reporter.probe_replication().await)
}
