use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use rwsplit::HealthStatus;
use std::sync::Arc;

use super::AppState;

/// Health check endpoint. Answers 503 only when no store is live.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.reporter.snapshot();
    let code = if report.status == HealthStatus::Down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(serde_json::json!({
            "status": report.status,
            "server_id": state.server_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "stores": report,
        })),
    )
}
