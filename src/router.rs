use crate::error::RoutingError;
use crate::selector::ReplicaSelector;
use crate::store::DataStoreHandle;
use crate::supervisor::Supervisor;
use crate::types::{Operation, OperationOutput, OperationResult};
use std::sync::Arc;

/// Sends writes to the master and reads to a round-robin replica.
///
/// There is no fallback between the two paths: a write never lands on a
/// replica and a read never lands on the master.
pub struct Router {
    supervisor: Arc<Supervisor>,
    selector: ReplicaSelector,
}

impl Router {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self {
            supervisor,
            selector: ReplicaSelector::new(),
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn selector(&self) -> &ReplicaSelector {
        &self.selector
    }

    /// Pick the handle that should serve `op`.
    pub async fn route(&self, op: &Operation) -> Result<Arc<DataStoreHandle>, RoutingError> {
        match op {
            Operation::Write(_) => self.route_write().await,
            Operation::Read(_) => self.route_read().await,
        }
    }

    async fn route_write(&self) -> Result<Arc<DataStoreHandle>, RoutingError> {
        let master = self.supervisor.master();
        if self.supervisor.probe_if_stale(master).await {
            Ok(Arc::clone(master))
        } else {
            tracing::debug!("[ROUTER] write rejected, master {} is down", master.identity());
            Err(RoutingError::MasterUnavailable(master.identity().to_string()))
        }
    }

    async fn route_read(&self) -> Result<Arc<DataStoreHandle>, RoutingError> {
        self.supervisor.refresh_replicas().await;
        self.selector
            .next(self.supervisor.replicas())
            .map_err(|e| {
                tracing::debug!("[ROUTER] read rejected: {}", e);
                RoutingError::from(e)
            })
    }

    /// Route and run `op` on the chosen handle.
    pub async fn execute(&self, op: Operation) -> Result<OperationOutput, RoutingError> {
        let handle = self.route(&op).await?;
        let result = match &op {
            Operation::Write(req) => OperationResult::Write(handle.write(req).await?),
            Operation::Read(req) => OperationResult::Read(handle.read(req).await?),
        };
        Ok(OperationOutput {
            served_by: handle.identity().to_string(),
            role: handle.role(),
            result,
        })
    }
}
