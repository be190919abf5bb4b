use http::StatusCode;
use thiserror::Error;

/// Failure reported by a store backend (connect, ping, read, write).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store {0} is unreachable")]
    Unreachable(String),

    #[error("Store {identity} did not answer within {after_ms} ms")]
    Timeout { identity: String, after_ms: u64 },

    #[error("Store {identity} rejected the request: {reason}")]
    Rejected { identity: String, reason: String },

    #[error("Connection to {0} is closed")]
    Closed(String),

    #[error("Unsupported store address: {0}")]
    UnsupportedAddr(String),

    #[error("Protocol error talking to {identity}: {reason}")]
    Protocol { identity: String, reason: String },
}

/// Returned by the replica selector when the live replica set is empty.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("No replica available for reads")]
pub struct NoReplicaAvailable;

/// Routing and execution failures surfaced to callers of the router.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("Master {0} is unavailable for writes")]
    MasterUnavailable(String),

    #[error("No replica available for reads")]
    NoReplicaAvailable,

    #[error("Operation failed on {identity}: {source}")]
    OperationFailure {
        identity: String,
        #[source]
        source: StoreError,
    },
}

impl From<NoReplicaAvailable> for RoutingError {
    fn from(_: NoReplicaAvailable) -> Self {
        RoutingError::NoReplicaAvailable
    }
}

impl RoutingError {
    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RoutingError::OperationFailure { .. })
    }
}

#[derive(Error, Debug, Clone)]
pub enum RwSplitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Master {0} is unavailable for writes")]
    MasterUnavailable(String),

    #[error("No replica available for reads")]
    NoReplicaAvailable,

    #[error("Operation failed on {identity}: {reason}")]
    OperationFailure { identity: String, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, RwSplitError>;

impl From<std::io::Error> for RwSplitError {
    fn from(e: std::io::Error) -> Self {
        RwSplitError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RwSplitError {
    fn from(e: serde_json::Error) -> Self {
        RwSplitError::Json(e.to_string())
    }
}

impl From<RoutingError> for RwSplitError {
    fn from(e: RoutingError) -> Self {
        match e {
            RoutingError::MasterUnavailable(identity) => RwSplitError::MasterUnavailable(identity),
            RoutingError::NoReplicaAvailable => RwSplitError::NoReplicaAvailable,
            RoutingError::OperationFailure { identity, source } => {
                RwSplitError::OperationFailure {
                    identity,
                    reason: source.to_string(),
                }
            }
        }
    }
}

impl RwSplitError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RwSplitError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RwSplitError::MasterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RwSplitError::NoReplicaAvailable => StatusCode::SERVICE_UNAVAILABLE,
            RwSplitError::OperationFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RwSplitError::Store(_) => StatusCode::BAD_GATEWAY,
            RwSplitError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RwSplitError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RwSplitError::Json(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short machine-readable tag for response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            RwSplitError::Config(_) => "config",
            RwSplitError::MasterUnavailable(_) => "master_unavailable",
            RwSplitError::NoReplicaAvailable => "no_replica_available",
            RwSplitError::OperationFailure { .. } => "operation_failure",
            RwSplitError::Store(_) => "store",
            RwSplitError::InvalidRequest(_) => "invalid_request",
            RwSplitError::Io(_) => "io",
            RwSplitError::Json(_) => "json",
        }
    }
}

#[cfg(feature = "axum-support")]
impl axum::response::IntoResponse for RwSplitError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        (status, body).into_response()
    }
}
