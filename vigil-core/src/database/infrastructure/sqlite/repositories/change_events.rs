use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};

use crate::database::ports::change_events::ChangeEventRepository;
use crate::error::{FimError, Result};
use crate::types::{ChangeEvent, ChangeEventRecord, path_from_key, path_key};

/// `change_events` table.
#[derive(Clone, Debug)]
pub struct SqliteChangeEventRepository {
    pool: SqlitePool,
}

impl SqliteChangeEventRepository {
    /// Wrap a pool whose schema is already migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Append one row, on the pool or inside a transaction.
pub(crate) async fn insert_event<'e, E>(executor: E, event: &ChangeEvent) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO change_events (file_path, change_kind, occurred_at)
        VALUES (?1, ?2, ?3)
        "#,
    )
    .bind(path_key(&event.path))
    .bind(event.kind.as_str())
    .bind(event.occurred_at)
    .execute(executor)
    .await
    .map_err(|e| FimError::Storage(format!("Failed to append change event: {}", e)))?;

    Ok(result.last_insert_rowid())
}

#[async_trait]
impl ChangeEventRepository for SqliteChangeEventRepository {
    async fn append(&self, event: &ChangeEvent) -> Result<i64> {
        insert_event(self.pool(), event).await
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<ChangeEventRecord>> {
        let rows = sqlx::query_as::<_, ChangeEventRow>(
            r#"
            SELECT id, file_path, change_kind, occurred_at
            FROM change_events
            ORDER BY occurred_at DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(|e| FimError::Storage(format!("Failed to list change events: {}", e)))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let kind = row.change_kind.parse().map_err(|e: String| {
                FimError::Storage(format!("corrupt change event {}: {}", row.id, e))
            })?;
            events.push(ChangeEventRecord {
                id: row.id,
                path: path_from_key(row.file_path),
                kind,
                occurred_at: row.occurred_at,
            });
        }

        Ok(events)
    }
}

#[derive(sqlx::FromRow)]
struct ChangeEventRow {
    id: i64,
    file_path: Vec<u8>,
    change_kind: String,
    occurred_at: DateTime<Utc>,
}
