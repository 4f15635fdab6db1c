//! Best-effort delivery of change alerts and file inventory to the remote
//! collector.
//!
//! Local state (baseline + event log) is authoritative and is always
//! committed before an alert is attempted. Delivery is a single attempt;
//! failures are logged and never propagated back into the diff engine.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{FimError, Result};
use crate::types::{AgentId, AlertPayload, BaselineRecord, ChangeKind, InventoryPayload};

/// Transport seam. A retrying implementation can wrap or replace the HTTP
/// transport without the engine noticing.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    /// One delivery attempt.
    async fn deliver(&self, payload: &AlertPayload) -> Result<()>;
}

/// Receiver for the metadata of files that were just added or modified.
#[async_trait]
pub trait InventoryTransport: Send + Sync {
    /// One delivery attempt.
    async fn report(&self, payload: &InventoryPayload) -> Result<()>;
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The transport accepted the payload.
    Delivered,
    /// The attempt failed and was logged; it is not retried.
    Failed,
}

/// Builds payloads for this agent and hands them to a transport.
#[derive(Clone)]
pub struct AlertDispatcher {
    agent_id: AgentId,
    transport: Arc<dyn AlertTransport>,
    inventory: Option<Arc<dyn InventoryTransport>>,
}

impl fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("agent_id", &self.agent_id)
            .field("inventory", &self.inventory.is_some())
            .finish_non_exhaustive()
    }
}

impl AlertDispatcher {
    /// Alerts only; inventory reporting stays off until
    /// [`with_inventory`](Self::with_inventory) is called.
    pub fn new(agent_id: AgentId, transport: Arc<dyn AlertTransport>) -> Self {
        Self {
            agent_id,
            transport,
            inventory: None,
        }
    }

    /// Also report file metadata after every ADDED and MODIFIED.
    pub fn with_inventory(mut self, inventory: Arc<dyn InventoryTransport>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Identity stamped on every payload.
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Send one alert. Never fails; the status says whether it arrived.
    pub async fn dispatch(
        &self,
        path: &Path,
        change_kind: ChangeKind,
        old_digest: Option<String>,
        new_digest: Option<String>,
    ) -> DeliveryStatus {
        let payload = AlertPayload {
            agent_id: self.agent_id.to_string(),
            file_path: path.to_string_lossy().into_owned(),
            change_type: change_kind,
            old_hash: old_digest,
            new_hash: new_digest,
        };

        match self.transport.deliver(&payload).await {
            Ok(()) => {
                info!(
                    path = %path.display(),
                    kind = %change_kind,
                    "alert delivered"
                );
                DeliveryStatus::Delivered
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    kind = %change_kind,
                    error = %err,
                    "alert delivery failed"
                );
                DeliveryStatus::Failed
            }
        }
    }

    /// Report the new baseline state of a file. `None` when inventory
    /// reporting is off or the record carries no digest.
    pub async fn report_inventory(&self, record: &BaselineRecord) -> Option<DeliveryStatus> {
        let inventory = self.inventory.as_ref()?;
        let hash = record.digest.clone()?;
        let payload = InventoryPayload {
            agent_id: self.agent_id.to_string(),
            path: record.path.to_string_lossy().into_owned(),
            hash,
            size: record.size,
            modified_at: record.modified_at,
        };

        match inventory.report(&payload).await {
            Ok(()) => {
                debug!(path = %record.path.display(), "inventory reported");
                Some(DeliveryStatus::Delivered)
            }
            Err(err) => {
                warn!(
                    path = %record.path.display(),
                    error = %err,
                    "inventory report failed"
                );
                Some(DeliveryStatus::Failed)
            }
        }
    }
}

/// JSON-over-HTTP POST to the configured collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpAlertTransport {
    poster: JsonPoster,
}

impl HttpAlertTransport {
    /// Client with a per-request timeout.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        Ok(Self {
            poster: JsonPoster::new(endpoint, timeout)?,
        })
    }

    /// Reuse an existing client.
    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self {
            poster: JsonPoster { client, endpoint },
        }
    }

    /// Where alerts are POSTed.
    pub fn endpoint(&self) -> &Url {
        &self.poster.endpoint
    }
}

#[async_trait]
impl AlertTransport for HttpAlertTransport {
    async fn deliver(&self, payload: &AlertPayload) -> Result<()> {
        self.poster.post(payload).await
    }
}

/// JSON-over-HTTP POST of file metadata to the collector's inventory API.
#[derive(Debug, Clone)]
pub struct HttpInventoryTransport {
    poster: JsonPoster,
}

impl HttpInventoryTransport {
    /// Client with a per-request timeout.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        Ok(Self {
            poster: JsonPoster::new(endpoint, timeout)?,
        })
    }

    /// Where inventory reports are POSTed.
    pub fn endpoint(&self) -> &Url {
        &self.poster.endpoint
    }
}

#[async_trait]
impl InventoryTransport for HttpInventoryTransport {
    async fn report(&self, payload: &InventoryPayload) -> Result<()> {
        self.poster.post(payload).await
    }
}

#[derive(Debug, Clone)]
struct JsonPoster {
    client: reqwest::Client,
    endpoint: Url,
}

impl JsonPoster {
    fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FimError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, endpoint })
    }

    async fn post<T: Serialize + Sync>(&self, body: &T) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| FimError::Delivery(format!("POST {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response
            .text()
            .await
            .ok()
            .and_then(|body| describe_rejection(status, &body));
        Err(FimError::Delivery(match detail {
            Some(detail) => format!("{} {}", status.as_u16(), detail),
            None => status.to_string(),
        }))
    }
}

#[derive(Deserialize)]
struct CollectorError {
    error: Option<String>,
}

/// Collectors answer rejections with `{"error": "..."}`; fall back to the
/// raw body or the status reason.
fn describe_rejection(status: StatusCode, body: &str) -> Option<String> {
    if let Ok(CollectorError { error: Some(error) }) = serde_json::from_str(body) {
        return Some(error);
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return Some(trimmed.chars().take(200).collect());
    }
    status.canonical_reason().map(str::to_string)
}
