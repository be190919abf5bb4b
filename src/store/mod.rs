//! Data store seam.
//!
//! The core never talks to a database directly. A [`StoreConnector`] turns a
//! [`StoreEndpoint`] into a live [`StoreConnection`]; the supervisor wraps each
//! connection in a [`DataStoreHandle`] that tracks liveness.

pub mod handle;
pub mod memory;

use crate::config::StoreEndpoint;
use crate::error::StoreError;
use crate::types::{ReadRequest, ReadResult, WriteOutcome, WriteRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use handle::DataStoreHandle;
pub use memory::{MemoryConnector, MemoryStore};

/// One open connection to a data store.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// Minimal round trip used as a liveness check.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn write(&self, req: &WriteRequest) -> Result<WriteOutcome, StoreError>;

    async fn read(&self, req: &ReadRequest) -> Result<ReadResult, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, endpoint: &StoreEndpoint) -> Result<Arc<dyn StoreConnection>, StoreError>;
}

/// Dispatches on the `scheme://` prefix of the endpoint address.
#[derive(Default, Clone)]
pub struct SchemeConnector {
    by_scheme: HashMap<String, Arc<dyn StoreConnector>>,
}

impl SchemeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scheme: &str, connector: Arc<dyn StoreConnector>) -> Self {
        self.by_scheme.insert(scheme.to_ascii_lowercase(), connector);
        self
    }

    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.by_scheme.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

/// Scheme of an address such as `http://host:port`, lowercased.
pub fn addr_scheme(addr: &str) -> Option<String> {
    addr.split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl StoreConnector for SchemeConnector {
    async fn connect(&self, endpoint: &StoreEndpoint) -> Result<Arc<dyn StoreConnection>, StoreError> {
        let connector = addr_scheme(&endpoint.addr)
            .and_then(|scheme| self.by_scheme.get(&scheme))
            .ok_or_else(|| StoreError::UnsupportedAddr(endpoint.addr.clone()))?;
        connector.connect(endpoint).await
    }
}
