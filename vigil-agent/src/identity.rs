//! Agent identity: configured, previously stored, or issued by the
//! registration service, in that order.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::{error, info};
use url::Url;
use vigil_config::AgentConfig;
use vigil_core::database::IdentityRepository;
use vigil_core::error::{FimError, Result};
use vigil_core::types::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Configured,
    Stored,
    Registered,
}

/// Host description sent when registering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub os: String,
    pub ip: String,
}

impl RegistrationRequest {
    pub async fn for_this_host() -> Self {
        let name = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown-host".to_string());
        Self {
            name,
            os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            ip: primary_ipv4().await.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationResponse {
    agent_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegistrationClient {
    client: reqwest::Client,
    url: Url,
}

impl RegistrationClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FimError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }

    /// Single attempt; no retry.
    pub async fn register(&self, request: &RegistrationRequest) -> Result<AgentId> {
        info!(url = %self.url, name = %request.name, ip = %request.ip, "registering agent");

        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| FimError::Delivery(format!("POST {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FimError::Delivery(format!(
                "registration rejected with {}",
                status
            )));
        }

        let body: RegistrationResponse = response
            .json()
            .await
            .map_err(|e| FimError::Delivery(format!("invalid registration response: {}", e)))?;

        match body.agent_id {
            Some(id) => AgentId::new(id),
            None => Err(FimError::Delivery(
                "registration response carried no agentId".into(),
            )),
        }
    }
}

/// Resolve the identity this agent reports under. A registered id is
/// persisted so later starts skip the network round trip.
pub async fn resolve_identity(
    agent: &AgentConfig,
    store: &dyn IdentityRepository,
    timeout: Duration,
) -> Result<(AgentId, IdentitySource)> {
    if let Some(id) = agent.agent_id.as_deref() {
        return Ok((AgentId::new(id)?, IdentitySource::Configured));
    }

    if let Some(id) = store.load().await? {
        return Ok((id, IdentitySource::Stored));
    }

    let Some(url) = agent.registration_url.clone() else {
        return Err(FimError::MissingIdentity);
    };

    let client = RegistrationClient::new(url, timeout)?;
    let request = RegistrationRequest::for_this_host().await;
    match client.register(&request).await {
        Ok(id) => {
            store.store(&id).await?;
            info!(agent_id = %id, "agent registered");
            Ok((id, IdentitySource::Registered))
        }
        Err(err) => {
            error!(error = %err, "agent registration failed");
            Err(FimError::MissingIdentity)
        }
    }
}

/// Address of the interface that would carry outbound traffic. Connecting a
/// UDP socket sends nothing; it only asks the OS to pick a route.
async fn primary_ipv4() -> IpAddr {
    let attempt = async {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
        socket.connect(SocketAddr::from(([192, 0, 2, 1], 80))).await?;
        socket.local_addr()
    };

    match attempt.await {
        Ok(addr) if !addr.ip().is_unspecified() => addr.ip(),
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}
