use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable name of a data store, e.g. `"master"` or `"slave1"`.
pub type StoreIdentity = String;
/// Record identifier inside a table.
pub type RecordId = String;

/// Which side of the read/write split a store sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Replica,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Replica => write!(f, "replica"),
        }
    }
}

/// A row stored in a data store table.
///
/// Fields are free-form JSON; `id` is unique per table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Build a record with a fresh v4 id.
    pub fn new(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), fields)
    }

    pub fn with_id(
        id: impl Into<RecordId>,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            fields,
            created_at: Utc::now(),
        }
    }

    /// Build a record from a JSON object; non-object values are rejected.
    pub fn from_json(id: impl Into<RecordId>, json: serde_json::Value) -> crate::Result<Self> {
        match json {
            serde_json::Value::Object(fields) => Ok(Self::with_id(id, fields)),
            other => Err(crate::RwSplitError::InvalidRequest(format!(
                "record fields must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteRequest {
    Insert { table: String, record: Record },
    Delete { table: String, id: RecordId },
}

impl WriteRequest {
    pub fn table(&self) -> &str {
        match self {
            WriteRequest::Insert { table, .. } | WriteRequest::Delete { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReadRequest {
    /// Fetch one record by id.
    Get { table: String, id: RecordId },
    /// Most recent records first, at most `limit`.
    List { table: String, limit: usize },
    /// Count records grouped by the string value of `field`.
    CountBy { table: String, field: String },
}

impl ReadRequest {
    pub fn table(&self) -> &str {
        match self {
            ReadRequest::Get { table, .. }
            | ReadRequest::List { table, .. }
            | ReadRequest::CountBy { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ReadResult {
    Record(Option<Record>),
    Records(Vec<Record>),
    Counts(Vec<GroupCount>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub affected: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
}

/// One client-requested action.
///
/// The variant is picked by the call site; the router never inspects the
/// payload to decide where it goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Read(ReadRequest),
    Write(WriteRequest),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Read(_) => OperationKind::Read,
            Operation::Write(_) => OperationKind::Write,
        }
    }
}

/// Result of executing an [`Operation`], tagged with the store that served it.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutput {
    pub served_by: StoreIdentity,
    pub role: Role,
    pub result: OperationResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Read(ReadResult),
    Write(WriteOutcome),
}
