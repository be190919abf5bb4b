use rwsplit::{ReadResult, WriteRequest};
use serde::{Deserialize, Serialize};

/// Response to `GET /internal/ping`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub node_id: String,
    pub online: bool,
}

/// Response to `POST /internal/write` and `POST /internal/replicate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResponse {
    pub node_id: String,
    pub affected: u64,
}

/// Response to `POST /internal/read`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub node_id: String,
    pub result: ReadResult,
}

/// A write forwarded from an upstream node to a follower
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub origin: String,
    pub op: WriteRequest,
}

/// Body of `POST /internal/online`, used to simulate outages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineRequest {
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatus {
    pub name: String,
    pub rows: usize,
}

/// Response to `GET /internal/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatus {
    pub node_id: String,
    pub online: bool,
    pub writes_applied: u64,
    pub reads_served: u64,
    pub followers: Vec<FollowerStatus>,
    pub tables: Vec<TableStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerStatus {
    pub node_id: String,
    pub acked: u64,
    pub failed: u64,
}

/// Error body returned by store node routes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}
