use super::types::{
    ErrorBody, PingResponse, ReadResponse, ReplicateRequest, StoreStatus, WriteResponse,
};
use async_trait::async_trait;
use rwsplit::store::{StoreConnection, StoreConnector};
use rwsplit::{ReadRequest, ReadResult, StoreEndpoint, StoreError, WriteOutcome, WriteRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// HTTP client for a single store node
pub struct RemoteStore {
    identity: String,
    base_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
    closed: AtomicBool,
    last_success: AtomicU64, // Unix timestamp in seconds
}

impl RemoteStore {
    pub fn new(identity: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(identity, base_url, timeout, http_client)
    }

    /// Share one connection pool across several stores.
    pub fn with_client(
        identity: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            identity: identity.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            timeout,
            closed: AtomicBool::new(false),
            last_success: AtomicU64::new(0),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn last_success_timestamp(&self) -> u64 {
        self.last_success.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Apply a write forwarded from `origin` without forwarding it further.
    pub async fn replicate(&self, origin: &str, op: &WriteRequest) -> Result<WriteOutcome, StoreError> {
        let req = ReplicateRequest {
            origin: origin.to_string(),
            op: op.clone(),
        };
        let resp: WriteResponse = self.post("/internal/replicate", &req).await?;
        Ok(WriteOutcome {
            affected: resp.affected,
        })
    }

    pub async fn status(&self) -> Result<StoreStatus, StoreError> {
        self.get("/internal/status").await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        self.ensure_open()?;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, StoreError> {
        self.ensure_open()?;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, StoreError> {
        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(StoreError::Unreachable(self.identity.clone()));
        }
        if !status.is_success() {
            let reason = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => format!("HTTP {}", status),
            };
            return Err(StoreError::Rejected {
                identity: self.identity.clone(),
                reason,
            });
        }

        let value = response.json::<T>().await.map_err(|e| StoreError::Protocol {
            identity: self.identity.clone(),
            reason: format!("failed to parse response: {}", e),
        })?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_success.store(now, Ordering::Relaxed);
        Ok(value)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            Err(StoreError::Closed(self.identity.clone()))
        } else {
            Ok(())
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout {
                identity: self.identity.clone(),
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            tracing::debug!("[PEER {}] transport error: {}", self.identity, e);
            StoreError::Unreachable(self.identity.clone())
        }
    }
}

#[async_trait]
impl StoreConnection for RemoteStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let resp: PingResponse = self.get("/internal/ping").await?;
        if resp.online {
            Ok(())
        } else {
            Err(StoreError::Unreachable(self.identity.clone()))
        }
    }

    async fn write(&self, req: &WriteRequest) -> Result<WriteOutcome, StoreError> {
        let resp: WriteResponse = self.post("/internal/write", req).await?;
        Ok(WriteOutcome {
            affected: resp.affected,
        })
    }

    async fn read(&self, req: &ReadRequest) -> Result<ReadResult, StoreError> {
        let resp: ReadResponse = self.post("/internal/read", req).await?;
        Ok(resp.result)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connects `http://` and `https://` endpoints, pinging once before
/// handing the connection out.
#[derive(Clone)]
pub struct HttpConnector {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http_client,
            timeout,
        }
    }
}

#[async_trait]
impl StoreConnector for HttpConnector {
    async fn connect(
        &self,
        endpoint: &StoreEndpoint,
    ) -> Result<Arc<dyn StoreConnection>, StoreError> {
        let addr = endpoint.addr.to_ascii_lowercase();
        if !addr.starts_with("http://") && !addr.starts_with("https://") {
            return Err(StoreError::UnsupportedAddr(endpoint.addr.clone()));
        }

        let store = RemoteStore::with_client(
            endpoint.identity.clone(),
            endpoint.addr.clone(),
            self.timeout,
            self.http_client.clone(),
        );
        store.ping().await?;
        Ok(Arc::new(store))
    }
}
