use super::StoreConnection;
use crate::config::StoreEndpoint;
use crate::error::{RoutingError, StoreError};
use crate::types::{ReadRequest, ReadResult, Role, WriteOutcome, WriteRequest};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// One logical connection to a master or replica store.
///
/// Created once by the supervisor and kept for the life of the process.
/// `live` is the last-known reachability; it flips on probe outcomes and on
/// operation failures. The connection slot is never locked across a round
/// trip: callers clone the `Arc` out and release the guard first.
pub struct DataStoreHandle {
    role: Role,
    endpoint: StoreEndpoint,
    op_timeout: Duration,
    live: AtomicBool,
    /// Millis of the last probe or connect; 0 means "probe on next use".
    last_probe_ms: AtomicU64,
    connect_attempts: AtomicU32,
    probing: AtomicBool,
    connection: RwLock<Option<Arc<dyn StoreConnection>>>,
}

impl std::fmt::Debug for DataStoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStoreHandle")
            .field("role", &self.role)
            .field("identity", &self.endpoint.identity)
            .field("live", &self.is_live())
            .field("last_probe_ms", &self.last_probe_ms.load(Ordering::Relaxed))
            .finish()
    }
}

impl DataStoreHandle {
    pub(crate) fn new(role: Role, endpoint: StoreEndpoint, op_timeout: Duration) -> Self {
        Self {
            role,
            endpoint,
            op_timeout,
            live: AtomicBool::new(false),
            last_probe_ms: AtomicU64::new(0),
            connect_attempts: AtomicU32::new(0),
            probing: AtomicBool::new(false),
            connection: RwLock::new(None),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn identity(&self) -> &str {
        &self.endpoint.identity
    }

    pub fn endpoint(&self) -> &StoreEndpoint {
        &self.endpoint
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// `None` until the first probe or connect attempt completes.
    pub fn last_probe_ms(&self) -> Option<u64> {
        match self.last_probe_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Connect attempts made so far, across startup and lazy reconnects.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    /// Whether the handle should be probed before use.
    pub fn is_stale(&self, now_ms: u64, interval: Duration) -> bool {
        match self.last_probe_ms() {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= interval.as_millis() as u64,
        }
    }

    /// Execute a write; failure flips the handle to not-live.
    pub async fn write(&self, req: &WriteRequest) -> Result<WriteOutcome, RoutingError> {
        let conn = self.require_connection().await?;
        self.run_op(conn.write(req)).await
    }

    /// Execute a read; failure flips the handle to not-live.
    pub async fn read(&self, req: &ReadRequest) -> Result<ReadResult, RoutingError> {
        let conn = self.require_connection().await?;
        self.run_op(conn.read(req)).await
    }

    pub(crate) fn set_live(&self, live: bool) -> bool {
        self.live.swap(live, Ordering::AcqRel)
    }

    pub(crate) fn record_probe(&self, now_ms: u64) {
        // 0 is reserved for "never"
        self.last_probe_ms.store(now_ms.max(1), Ordering::Release);
    }

    pub(crate) fn mark_stale(&self) {
        self.last_probe_ms.store(0, Ordering::Release);
    }

    pub(crate) fn record_connect_attempt(&self) -> u32 {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Only one caller at a time runs a lazy probe on this handle. The slot
    /// is freed when the guard drops, including when the probing future is
    /// cancelled mid-flight.
    pub(crate) fn try_begin_probe(&self) -> Option<ProbeGuard<'_>> {
        self.probing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProbeGuard { handle: self })
    }

    pub(crate) async fn connection(&self) -> Option<Arc<dyn StoreConnection>> {
        self.connection.read().await.clone()
    }

    pub(crate) async fn install(&self, conn: Arc<dyn StoreConnection>) {
        *self.connection.write().await = Some(conn);
    }

    pub(crate) async fn take_connection(&self) -> Option<Arc<dyn StoreConnection>> {
        self.connection.write().await.take()
    }

    async fn require_connection(&self) -> Result<Arc<dyn StoreConnection>, RoutingError> {
        match self.connection().await {
            Some(conn) => Ok(conn),
            None => {
                let err = StoreError::Closed(self.identity().to_string());
                self.fail(&err).await;
                Err(RoutingError::OperationFailure {
                    identity: self.identity().to_string(),
                    source: err,
                })
            }
        }
    }

    async fn run_op<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, RoutingError> {
        let result = match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                identity: self.identity().to_string(),
                after_ms: self.op_timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(value) => Ok(value),
            Err(source) => {
                self.fail(&source).await;
                Err(RoutingError::OperationFailure {
                    identity: self.identity().to_string(),
                    source,
                })
            }
        }
    }

    /// Mark not-live after an operation failure and drop the connection so
    /// the next probe reconnects.
    async fn fail(&self, err: &StoreError) {
        let was_live = self.set_live(false);
        self.mark_stale();
        if let Some(conn) = self.take_connection().await {
            let _ = tokio::time::timeout(self.op_timeout, conn.close()).await;
        }
        if was_live {
            tracing::warn!(
                "[STORE {}] {} marked down after operation failure: {}",
                self.identity(),
                self.role,
                err
            );
        }
    }
}

pub(crate) struct ProbeGuard<'a> {
    handle: &'a DataStoreHandle,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.handle.probing.store(false, Ordering::Release);
    }
}
