//! Round-robin replica selection.
//!
//! The rotation is recomputed from current liveness on every call: the live
//! subsequence of the pool, in configured order, indexed by a process-wide
//! cursor. A replica that comes back rejoins at its configured position.

use crate::error::NoReplicaAvailable;
use crate::store::DataStoreHandle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ReplicaSelector {
    cursor: AtomicU64,
}

impl ReplicaSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next live replica.
    ///
    /// Every successful call takes exactly one distinct cursor value, even
    /// under concurrent callers. An empty live set leaves the cursor alone.
    pub fn next(
        &self,
        pool: &[Arc<DataStoreHandle>],
    ) -> Result<Arc<DataStoreHandle>, NoReplicaAvailable> {
        let live: Vec<&Arc<DataStoreHandle>> = pool.iter().filter(|h| h.is_live()).collect();
        if live.is_empty() {
            return Err(NoReplicaAvailable);
        }

        let ticket = self.cursor.fetch_add(1, Ordering::SeqCst);
        let index = (ticket % live.len() as u64) as usize;
        Ok(Arc::clone(live[index]))
    }

    /// Current cursor value (number of successful selections so far).
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }
}
