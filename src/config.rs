use crate::error::{Result, RwSplitError};
use crate::retry::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 3000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 5000;

/// Where a store lives. `addr` is interpreted by the connector only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEndpoint {
    pub identity: String,
    pub addr: String, // e.g. "memory://master" or "http://db-slave1:7800"
}

impl StoreEndpoint {
    pub fn new(identity: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            addr: addr.into(),
        }
    }

    /// Parse `identity=addr`; a bare `addr` uses itself as identity.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(RwSplitError::Config("empty store endpoint".into()));
        }
        match spec.split_once('=') {
            Some((identity, addr)) => {
                let (identity, addr) = (identity.trim(), addr.trim());
                if identity.is_empty() || addr.is_empty() {
                    return Err(RwSplitError::Config(format!(
                        "invalid store endpoint: {}",
                        spec
                    )));
                }
                Ok(Self::new(identity, addr))
            }
            None => Ok(Self::new(spec, spec)),
        }
    }
}

/// Master + ordered replicas and the timing knobs of the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub server_id: String,
    pub master: StoreEndpoint,
    #[serde(default)]
    pub replicas: Vec<StoreEndpoint>,
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// When set, the connect delay doubles from `retry_delay_ms` up to this cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_max_delay_ms: Option<u64>,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

fn default_max_connect_attempts() -> u32 {
    DEFAULT_MAX_CONNECT_ATTEMPTS
}
fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}
fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}
fn default_probe_interval_ms() -> u64 {
    DEFAULT_PROBE_INTERVAL_MS
}
fn default_op_timeout_ms() -> u64 {
    DEFAULT_OP_TIMEOUT_MS
}

impl TopologyConfig {
    /// Topology with repository defaults for every timing knob.
    pub fn new(
        server_id: impl Into<String>,
        master: StoreEndpoint,
        replicas: Vec<StoreEndpoint>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            master,
            replicas,
            max_connect_attempts: DEFAULT_MAX_CONNECT_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            retry_max_delay_ms: None,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            op_timeout_ms: DEFAULT_OP_TIMEOUT_MS,
        }
    }

    /// Load from a JSON file, falling back to the environment when the file is
    /// missing or unreadable.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<TopologyConfig>(&content) {
                    Ok(config) => {
                        tracing::info!(
                            "Loaded topology: server_id={}, master={}, replicas={}",
                            config.server_id,
                            config.master.identity,
                            config.replicas.len()
                        );
                        config.validate()?;
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to parse {}: {}, using environment",
                            path.display(),
                            e
                        );
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to read {}: {}, using environment", path.display(), e);
                }
            }
        } else {
            tracing::info!("No {} found, reading topology from environment", path.display());
        }

        Self::from_env()
    }

    /// Build from `RWSPLIT_*` environment variables.
    ///
    /// Required: RWSPLIT_MASTER (`identity=addr` or bare addr)
    /// Optional: RWSPLIT_REPLICAS (comma-separated `identity=addr`),
    /// RWSPLIT_SERVER_ID (defaults to "unknown"), and the numeric knobs
    /// RWSPLIT_MAX_CONNECT_ATTEMPTS, RWSPLIT_RETRY_DELAY_MS, RWSPLIT_RETRY_MAX_DELAY_MS,
    /// RWSPLIT_SETTLE_DELAY_MS, RWSPLIT_PROBE_INTERVAL_MS, RWSPLIT_OP_TIMEOUT_MS.
    pub fn from_env() -> Result<Self> {
        let master = env::var("RWSPLIT_MASTER")
            .map_err(|_| RwSplitError::Config("RWSPLIT_MASTER is required".into()))?;
        let master = StoreEndpoint::parse(&master)?;

        let replicas = match env::var("RWSPLIT_REPLICAS") {
            Ok(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(StoreEndpoint::parse)
                .collect::<Result<Vec<_>>>()?,
            Err(_) => Vec::new(),
        };

        let server_id = env::var("RWSPLIT_SERVER_ID").unwrap_or_else(|_| "unknown".to_string());

        let config = Self {
            server_id,
            master,
            replicas,
            max_connect_attempts: env_number(
                "RWSPLIT_MAX_CONNECT_ATTEMPTS",
                DEFAULT_MAX_CONNECT_ATTEMPTS,
            )?,
            retry_delay_ms: env_number("RWSPLIT_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?,
            retry_max_delay_ms: match env::var("RWSPLIT_RETRY_MAX_DELAY_MS") {
                Ok(_) => Some(env_number("RWSPLIT_RETRY_MAX_DELAY_MS", 0)?),
                Err(_) => None,
            },
            settle_delay_ms: env_number("RWSPLIT_SETTLE_DELAY_MS", DEFAULT_SETTLE_DELAY_MS)?,
            probe_interval_ms: env_number("RWSPLIT_PROBE_INTERVAL_MS", DEFAULT_PROBE_INTERVAL_MS)?,
            op_timeout_ms: env_number("RWSPLIT_OP_TIMEOUT_MS", DEFAULT_OP_TIMEOUT_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connect_attempts == 0 {
            return Err(RwSplitError::Config(
                "max_connect_attempts must be at least 1".into(),
            ));
        }

        let mut seen = HashSet::new();
        for endpoint in std::iter::once(&self.master).chain(self.replicas.iter()) {
            if endpoint.identity.trim().is_empty() {
                return Err(RwSplitError::Config("store identity must not be empty".into()));
            }
            if endpoint.addr.trim().is_empty() {
                return Err(RwSplitError::Config(format!(
                    "store {} has an empty address",
                    endpoint.identity
                )));
            }
            if !seen.insert(endpoint.identity.as_str()) {
                return Err(RwSplitError::Config(format!(
                    "duplicate store identity: {}",
                    endpoint.identity
                )));
            }
        }

        Ok(())
    }

    /// Fixed delay by default; exponential when `retry_max_delay_ms` is set.
    pub fn retry_policy(&self) -> RetryPolicy {
        let initial = Duration::from_millis(self.retry_delay_ms);
        let backoff = match self.retry_max_delay_ms {
            Some(max_ms) => Backoff::Exponential {
                initial,
                max: Duration::from_millis(max_ms.max(self.retry_delay_ms)),
            },
            None => Backoff::Fixed(initial),
        };
        RetryPolicy::new(self.max_connect_attempts, backoff)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RwSplitError::Config(format!("Invalid {}: {}", name, raw))),
        Err(_) => Ok(default),
    }
}
