use rwsplit::StoreEndpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_STORE_BIND_ADDR: &str = "127.0.0.1:7800";

/// Configuration of one store node process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreNodeConfig {
    pub node_id: String,
    pub bind_addr: String,
    /// Nodes that receive every write this node accepts.
    #[serde(default)]
    pub followers: Vec<FollowerConfig>,
    /// Delay before a write is forwarded to followers.
    #[serde(default)]
    pub lag_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerConfig {
    pub node_id: String,
    pub addr: String, // e.g., "http://slave1:7800"
}

impl From<StoreEndpoint> for FollowerConfig {
    fn from(ep: StoreEndpoint) -> Self {
        Self {
            node_id: ep.identity,
            addr: ep.addr,
        }
    }
}

impl StoreNodeConfig {
    /// Load from {data_dir}/node.json, else from RWSPLIT_NODE_ID,
    /// RWSPLIT_BIND_ADDR, RWSPLIT_FOLLOWERS and RWSPLIT_LAG_MS.
    pub fn load_or_default(data_dir: &Path) -> Self {
        let node_json = data_dir.join("node.json");

        if node_json.exists() {
            match std::fs::read_to_string(&node_json) {
                Ok(content) => match serde_json::from_str::<StoreNodeConfig>(&content) {
                    Ok(config) => {
                        tracing::info!(
                            "Loaded node config: node_id={}, followers={}, lag_ms={}",
                            config.node_id,
                            config.followers.len(),
                            config.lag_ms
                        );
                        return config;
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse node.json: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to read node.json: {}, using defaults", e);
                }
            }
        }

        let node_id = std::env::var("RWSPLIT_NODE_ID").unwrap_or_else(|_| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string())
        });

        let bind_addr = std::env::var("RWSPLIT_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_STORE_BIND_ADDR.to_string());

        let followers: Vec<FollowerConfig> = std::env::var("RWSPLIT_FOLLOWERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| match StoreEndpoint::parse(s) {
                        Ok(ep) => Some(FollowerConfig::from(ep)),
                        Err(e) => {
                            tracing::warn!("Ignoring follower {:?}: {}", s, e);
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let lag_ms = match std::env::var("RWSPLIT_LAG_MS") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Ignoring invalid RWSPLIT_LAG_MS={:?}", raw);
                0
            }),
            Err(_) => 0,
        };

        tracing::info!(
            "No node.json found, configured from environment: node_id={}, followers={}",
            node_id,
            followers.len()
        );

        StoreNodeConfig {
            node_id,
            bind_addr,
            followers,
            lag_ms,
        }
    }
}
