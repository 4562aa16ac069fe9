//! HTTP client for the Link Database, used by the slice manager, the
//! controllers, and the agents.
//!
//! Transport failures and 5xx responses retry with bounded exponential
//! backoff (base 0.5 s, doubling, cap 10 s, max 5 attempts). Domain
//! rejections (4xx) surface immediately as [`ClientError::Api`] carrying
//! the service's error message.

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use wave_core::api::ApiResponse;
use wave_core::{
    Connection, ConnectionStatus, Interface, InterfaceRef, Topology, VirtualOperator,
};

use crate::service::{
    AllocateRequest, AllocateResponse, HealthView, PathView, ReleaseRequest, ReserveRequest,
    SlotView, StatusUpdate,
};

/// Result type alias for LinkDB client calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the LinkDB client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("linkdb transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("linkdb rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("linkdb response decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Api { status: 409, .. })
    }
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Fast policy for tests.
    pub fn immediate() -> Self {
        RetryPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
            max_attempts: 2,
        }
    }
}

/// HTTP client for one LinkDB endpoint.
#[derive(Clone)]
pub struct LinkDbClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl LinkDbClient {
    /// Create a client for `http://host:port`.
    pub fn new(base_url: impl Into<String>) -> Self {
        LinkDbClient {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut delay = self.retry.base;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut request = self.http.request(method.clone(), &url);
            if let Some(b) = body {
                request = request.json(b);
            }

            let retryable = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() && attempt < self.retry.max_attempts {
                        true
                    } else {
                        let envelope: ApiResponse<T> = resp
                            .json()
                            .await
                            .map_err(|e| ClientError::Decode(e.to_string()))?;
                        return if envelope.success {
                            envelope.into_data().map_err(ClientError::Decode)
                        } else {
                            Err(ClientError::Api {
                                status: status.as_u16(),
                                message: envelope
                                    .error
                                    .unwrap_or_else(|| "unknown error".to_string()),
                            })
                        };
                    }
                }
                Err(e) => {
                    if (e.is_connect() || e.is_timeout()) && attempt < self.retry.max_attempts {
                        true
                    } else {
                        return Err(ClientError::Http(e));
                    }
                }
            };

            if retryable {
                warn!(%url, attempt, delay_ms = delay.as_millis() as u64, "linkdb request retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(self.retry.cap);
            }
        }
    }

    // ── Health & topology ──────────────────────────────────────────

    pub async fn health(&self) -> ClientResult<HealthView> {
        self.send::<(), _>(Method::GET, "/health", None).await
    }

    pub async fn topology(&self) -> ClientResult<Topology> {
        self.send::<(), _>(Method::GET, "/api/topology", None).await
    }

    pub async fn paths(&self, src: &str, dst: &str) -> ClientResult<Vec<PathView>> {
        self.send::<(), _>(Method::GET, &format!("/api/topology/path/{src}/{dst}"), None)
            .await
    }

    pub async fn frequencies(&self, link_id: &str) -> ClientResult<Vec<SlotView>> {
        self.send::<(), _>(Method::GET, &format!("/api/frequencies/{link_id}"), None)
            .await
    }

    // ── Interfaces ─────────────────────────────────────────────────

    pub async fn interfaces(&self, pop: &str, router: &str) -> ClientResult<Vec<Interface>> {
        self.send::<(), _>(Method::GET, &format!("/api/interfaces/{pop}/{router}"), None)
            .await
    }

    pub async fn reserve_interfaces(
        &self,
        vop_id: &str,
        interfaces: &[InterfaceRef],
    ) -> ClientResult<usize> {
        let req = ReserveRequest {
            vop_id: vop_id.to_string(),
            interfaces: interfaces.to_vec(),
        };
        self.send(Method::POST, "/api/interfaces/reserve", Some(&req))
            .await
    }

    pub async fn release_interfaces(&self, vop_id: &str) -> ClientResult<u32> {
        let req = ReleaseRequest {
            vop_id: vop_id.to_string(),
        };
        self.send(Method::POST, "/api/interfaces/release", Some(&req))
            .await
    }

    // ── Virtual operators ──────────────────────────────────────────

    pub async fn put_vop(&self, vop: &VirtualOperator) -> ClientResult<VirtualOperator> {
        self.send(Method::POST, "/api/vops", Some(vop)).await
    }

    pub async fn get_vop(&self, vop_id: &str) -> ClientResult<Option<VirtualOperator>> {
        match self
            .send::<(), VirtualOperator>(Method::GET, &format!("/api/vops/{vop_id}"), None)
            .await
        {
            Ok(vop) => Ok(Some(vop)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_vops(&self) -> ClientResult<Vec<VirtualOperator>> {
        self.send::<(), _>(Method::GET, "/api/vops", None).await
    }

    // ── Connections & spectrum ─────────────────────────────────────

    pub async fn allocate(&self, req: &AllocateRequest) -> ClientResult<AllocateResponse> {
        self.send(Method::POST, "/api/connections/allocate", Some(req))
            .await
    }

    pub async fn release_spectrum(&self, connection_id: &str) -> ClientResult<u32> {
        self.send::<(), _>(
            Method::POST,
            &format!("/api/connections/{connection_id}/release"),
            None,
        )
        .await
    }

    pub async fn put_connection(&self, conn: &Connection) -> ClientResult<Connection> {
        self.send(
            Method::PUT,
            &format!("/api/connections/{}", conn.connection_id),
            Some(conn),
        )
        .await
    }

    pub async fn get_connection(&self, connection_id: &str) -> ClientResult<Option<Connection>> {
        match self
            .send::<(), Connection>(Method::GET, &format!("/api/connections/{connection_id}"), None)
            .await
        {
            Ok(conn) => Ok(Some(conn)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_connections(&self) -> ClientResult<Vec<Connection>> {
        self.send::<(), _>(Method::GET, "/api/connections", None).await
    }

    pub async fn set_connection_status(
        &self,
        connection_id: &str,
        status: ConnectionStatus,
    ) -> ClientResult<Connection> {
        let req = StatusUpdate { status };
        self.send(
            Method::PUT,
            &format!("/api/connections/{connection_id}/status"),
            Some(&req),
        )
        .await
    }

    pub async fn delete_connection(&self, connection_id: &str) -> ClientResult<bool> {
        self.send::<(), _>(
            Method::DELETE,
            &format!("/api/connections/{connection_id}"),
            None,
        )
        .await
    }
}
