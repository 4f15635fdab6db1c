use async_trait::async_trait;

use crate::error::Result;
use crate::types::AgentId;

/// Local copy of the identity handed out by the registration service.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// The stored identity, if one was ever persisted.
    async fn load(&self) -> Result<Option<AgentId>>;

    /// Replace the stored identity.
    async fn store(&self, agent_id: &AgentId) -> Result<()>;
}
