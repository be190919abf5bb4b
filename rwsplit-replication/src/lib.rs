//! HTTP plumbing between the application server and store nodes.
//!
//! [`peer::HttpConnector`] lets the supervisor reach a store node over
//! `http://`. [`feed::FollowerFeed`] forwards writes accepted by a store node
//! to its followers, standing in for the database's own replication.

pub mod config;
pub mod feed;
pub mod peer;
pub mod types;

pub use config::{FollowerConfig, StoreNodeConfig};
pub use feed::FollowerFeed;
pub use peer::{HttpConnector, RemoteStore};
