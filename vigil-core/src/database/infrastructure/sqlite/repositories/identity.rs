use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::database::ports::identity::IdentityRepository;
use crate::error::{FimError, Result};
use crate::types::AgentId;

/// Single-row `agent_identity` table.
#[derive(Clone, Debug)]
pub struct SqliteIdentityRepository {
    pool: SqlitePool,
}

impl SqliteIdentityRepository {
    /// Wrap a pool whose schema is already migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for SqliteIdentityRepository {
    async fn load(&self) -> Result<Option<AgentId>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT agent_id FROM agent_identity WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| FimError::Storage(format!("Failed to load agent identity: {}", e)))?;

        // A blank stored id counts as never registered.
        Ok(row.and_then(|(agent_id,)| AgentId::new(agent_id).ok()))
    }

    async fn store(&self, agent_id: &AgentId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_identity (id, agent_id, registered_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                agent_id = excluded.agent_id,
                registered_at = excluded.registered_at
            "#,
        )
        .bind(agent_id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| FimError::Storage(format!("Failed to store agent identity: {}", e)))?;

        Ok(())
    }
}
