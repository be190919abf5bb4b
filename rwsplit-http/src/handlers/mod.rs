use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rwsplit::store::MemoryStore;
use rwsplit::{Reporter, RoutingError, RwSplitError, Supervisor};
use rwsplit_replication::FollowerFeed;
use std::sync::Arc;

pub mod api;
pub mod health;
pub mod internal;
pub mod replication;

/// State of an application server instance.
pub struct AppState {
    pub server_id: String,
    pub router: Arc<rwsplit::Router>,
    pub reporter: Reporter,
}

impl AppState {
    pub fn new(supervisor: Arc<Supervisor>) -> Arc<Self> {
        let server_id = supervisor.server_id().to_string();
        let router = Arc::new(rwsplit::Router::new(supervisor));
        Arc::new(Self {
            server_id,
            reporter: Reporter::new(Arc::clone(&router)),
            router,
        })
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        self.router.supervisor()
    }
}

/// State of a store node process.
pub struct StoreNodeState {
    pub node_id: String,
    pub store: Arc<MemoryStore>,
    pub feed: Arc<FollowerFeed>,
}

/// Error response of the application routes: the crate error plus the
/// answering instance, so a load-balanced client can tell who failed.
pub struct ApiError {
    pub server_id: String,
    pub error: RwSplitError,
}

impl ApiError {
    pub fn new(server_id: &str, error: impl Into<RwSplitError>) -> Self {
        Self {
            server_id: server_id.to_string(),
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("[{}] request failed: {}", self.server_id, self.error);
        } else {
            tracing::warn!("[{}] request rejected: {}", self.server_id, self.error);
        }
        (
            status,
            Json(serde_json::json!({
                "error": self.error.to_string(),
                "kind": self.error.kind(),
                "server_id": self.server_id,
            })),
        )
            .into_response()
    }
}

pub(crate) fn routing_error(state: &AppState, e: RoutingError) -> ApiError {
    ApiError::new(&state.server_id, e)
}

pub use api::{banner, list_requests, server_info, stats};
pub use health::health;
pub use replication::{probe_replication, replication_status};
