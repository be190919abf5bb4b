//! # rwsplit
//!
//! Read/write request splitting for an application server that talks to one
//! master data store and a pool of read replicas. Writes always go to the
//! master; reads are spread round-robin across whichever replicas are live.
//!
//! The crate owns the connection-routing layer only:
//!
//! - [`Supervisor`] connects the master and replicas at startup with a bounded
//!   retry, tracks per-handle liveness, and re-probes lazily before reuse.
//! - [`ReplicaSelector`] picks the next live replica from a shared cursor.
//! - [`Router`] classifies an [`Operation`] and returns the handle to use,
//!   surfacing [`RoutingError`] instead of falling back across paths.
//! - [`Reporter`] snapshots health and runs a synthetic write-then-read-all
//!   replication probe.
//!
//! Stores are reached through the [`store::StoreConnector`] trait. The crate
//! ships an in-memory backend; `rwsplit-replication` adds an HTTP client.
//!
//! ```rust,no_run
//! use rwsplit::store::{MemoryConnector, MemoryStore};
//! use rwsplit::{Operation, ReadRequest, Router, StoreEndpoint, Supervisor, TopologyConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> rwsplit::Result<()> {
//! let connector = MemoryConnector::new();
//! for name in ["master", "slave1", "slave2"] {
//!     connector.register(MemoryStore::new(name));
//! }
//!
//! let config = TopologyConfig::new(
//!     "app1",
//!     StoreEndpoint::new("master", "memory://master"),
//!     vec![
//!         StoreEndpoint::new("slave1", "memory://slave1"),
//!         StoreEndpoint::new("slave2", "memory://slave2"),
//!     ],
//! );
//! let supervisor = Supervisor::start(config, Arc::new(connector)).await?;
//! let router = Router::new(supervisor);
//!
//! let out = router
//!     .execute(Operation::Read(ReadRequest::List { table: "requests".into(), limit: 10 }))
//!     .await?;
//! println!("served by {}", out.served_by);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod reporter;
pub mod retry;
pub mod router;
pub mod selector;
pub mod store;
pub mod supervisor;
pub mod types;

pub use config::{StoreEndpoint, TopologyConfig};
pub use error::{NoReplicaAvailable, Result, RoutingError, RwSplitError, StoreError};
pub use reporter::{HealthReport, HealthStatus, ReplicationProbe, Reporter};
pub use retry::{Backoff, RetryPolicy};
pub use router::Router;
pub use selector::ReplicaSelector;
pub use store::DataStoreHandle;
pub use supervisor::Supervisor;
pub use types::*;
