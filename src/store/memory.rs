use super::{StoreConnection, StoreConnector};
use crate::config::StoreEndpoint;
use crate::error::StoreError;
use crate::types::{GroupCount, ReadRequest, ReadResult, Record, RecordId, WriteOutcome, WriteRequest};
use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-process data store: named tables of records in insertion order.
///
/// `set_online(false)` makes every connect and round trip fail, and
/// `set_latency` delays them, which is how tests and demos simulate outages
/// and slow stores.
pub struct MemoryStore {
    name: String,
    tables: DashMap<String, IndexMap<RecordId, Record>>,
    online: AtomicBool,
    latency_ms: AtomicU64,
    writes_applied: AtomicU64,
    reads_served: AtomicU64,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            tables: DashMap::new(),
            online: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            writes_applied: AtomicU64::new(0),
            reads_served: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            tracing::info!("[STORE {}] online={}", self.name, online);
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms.load(Ordering::SeqCst))
    }

    pub fn writes_applied(&self) -> u64 {
        self.writes_applied.load(Ordering::Relaxed)
    }

    pub fn reads_served(&self) -> u64 {
        self.reads_served.load(Ordering::Relaxed)
    }

    pub fn table_len(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Apply a write directly, bypassing the online switch.
    pub fn apply_write(&self, req: &WriteRequest) -> WriteOutcome {
        let affected = match req {
            WriteRequest::Insert { table, record } => {
                self.tables
                    .entry(table.clone())
                    .or_default()
                    .insert(record.id.clone(), record.clone());
                1
            }
            WriteRequest::Delete { table, id } => match self.tables.get_mut(table) {
                Some(mut rows) => u64::from(rows.shift_remove(id).is_some()),
                None => 0,
            },
        };
        self.writes_applied.fetch_add(1, Ordering::Relaxed);
        WriteOutcome { affected }
    }

    /// Answer a read directly, bypassing the online switch.
    pub fn apply_read(&self, req: &ReadRequest) -> ReadResult {
        self.reads_served.fetch_add(1, Ordering::Relaxed);
        let Some(rows) = self.tables.get(req.table()) else {
            return match req {
                ReadRequest::Get { .. } => ReadResult::Record(None),
                ReadRequest::List { .. } => ReadResult::Records(Vec::new()),
                ReadRequest::CountBy { .. } => ReadResult::Counts(Vec::new()),
            };
        };

        match req {
            ReadRequest::Get { id, .. } => ReadResult::Record(rows.get(id).cloned()),
            ReadRequest::List { limit, .. } => {
                ReadResult::Records(rows.values().rev().take(*limit).cloned().collect())
            }
            ReadRequest::CountBy { field, .. } => {
                let mut counts: BTreeMap<String, u64> = BTreeMap::new();
                for record in rows.values() {
                    let key = match record.fields.get(field) {
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(serde_json::Value::Null) | None => continue,
                        Some(other) => other.to_string(),
                    };
                    *counts.entry(key).or_insert(0) += 1;
                }
                ReadResult::Counts(
                    counts
                        .into_iter()
                        .map(|(key, count)| GroupCount { key, count })
                        .collect(),
                )
            }
        }
    }

    async fn round_trip(&self) -> Result<(), StoreError> {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.is_online() {
            Ok(())
        } else {
            Err(StoreError::Unreachable(self.name.clone()))
        }
    }
}

/// Resolves `memory://<name>` addresses against registered stores.
#[derive(Default)]
pub struct MemoryConnector {
    stores: DashMap<String, Arc<MemoryStore>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, store: Arc<MemoryStore>) {
        self.stores.insert(store.name().to_string(), store);
    }

    pub fn store(&self, name: &str) -> Option<Arc<MemoryStore>> {
        self.stores.get(name).map(|s| Arc::clone(s.value()))
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, endpoint: &StoreEndpoint) -> Result<Arc<dyn StoreConnection>, StoreError> {
        let name = endpoint
            .addr
            .strip_prefix("memory://")
            .ok_or_else(|| StoreError::UnsupportedAddr(endpoint.addr.clone()))?;
        let store = self
            .store(name)
            .ok_or_else(|| StoreError::Unreachable(endpoint.identity.clone()))?;

        store.round_trip().await?;

        Ok(Arc::new(MemoryConnection {
            store,
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    store: Arc<MemoryStore>,
    closed: AtomicBool,
}

impl MemoryConnection {
    async fn ready(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed(self.store.name().to_string()));
        }
        self.store.round_trip().await
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn ping(&self) -> Result<(), StoreError> {
        self.ready().await
    }

    async fn write(&self, req: &WriteRequest) -> Result<WriteOutcome, StoreError> {
        self.ready().await?;
        Ok(self.store.apply_write(req))
    }

    async fn read(&self, req: &ReadRequest) -> Result<ReadResult, StoreError> {
        self.ready().await?;
        Ok(self.store.apply_read(req))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
