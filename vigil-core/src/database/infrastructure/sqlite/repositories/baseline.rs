use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};

use crate::database::ports::baseline::BaselineRepository;
use crate::error::{FimError, Result};
use crate::types::{BaselineRecord, path_from_key, path_key};

/// `files_baseline` table.
#[derive(Clone, Debug)]
pub struct SqliteBaselineRepository {
    pool: SqlitePool,
}

impl SqliteBaselineRepository {
    /// Wrap a pool whose schema is already migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Single-statement upsert, usable on the pool or inside a transaction.
pub(crate) async fn upsert_row<'e, E>(executor: E, record: &BaselineRecord) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let size = i64::try_from(record.size).map_err(|_| {
        FimError::Storage(format!(
            "file size {} out of range for {}",
            record.size,
            record.path.display()
        ))
    })?;

    sqlx::query(
        r#"
        INSERT INTO files_baseline (file_path, digest, size, modified_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(file_path) DO UPDATE SET
            digest = excluded.digest,
            size = excluded.size,
            modified_at = excluded.modified_at
        "#,
    )
    .bind(record.key())
    .bind(record.digest.clone())
    .bind(size)
    .bind(record.modified_at)
    .execute(executor)
    .await
    .map_err(|e| FimError::Storage(format!("Failed to upsert baseline: {}", e)))?;

    Ok(())
}

/// Returns whether a row was deleted.
pub(crate) async fn delete_row<'e, E>(executor: E, path: &Path) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM files_baseline WHERE file_path = ?1")
        .bind(path_key(path))
        .execute(executor)
        .await
        .map_err(|e| FimError::Storage(format!("Failed to remove baseline: {}", e)))?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl BaselineRepository for SqliteBaselineRepository {
    async fn lookup(&self, path: &Path) -> Result<Option<BaselineRecord>> {
        let row = sqlx::query_as::<_, BaselineRow>(
            r#"
            SELECT file_path, digest, size, modified_at
            FROM files_baseline
            WHERE file_path = ?1
            "#,
        )
        .bind(path_key(path))
        .fetch_optional(self.pool())
        .await
        .map_err(|e| FimError::Storage(format!("Failed to look up baseline: {}", e)))?;

        Ok(row.map(BaselineRecord::from))
    }

    async fn upsert(&self, record: &BaselineRecord) -> Result<()> {
        upsert_row(self.pool(), record).await
    }

    async fn remove(&self, path: &Path) -> Result<bool> {
        delete_row(self.pool(), path).await
    }

    async fn list_paths(&self) -> Result<Vec<PathBuf>> {
        let rows: Vec<(Vec<u8>,)> =
            sqlx::query_as("SELECT file_path FROM files_baseline ORDER BY file_path")
                .fetch_all(self.pool())
                .await
                .map_err(|e| {
                    FimError::Storage(format!("Failed to list baseline paths: {}", e))
                })?;

        Ok(rows.into_iter().map(|(key,)| path_from_key(key)).collect())
    }

    async fn list_under(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let Some((lower, upper)) = descendant_range(dir) else {
            return Ok(Vec::new());
        };

        let rows: Vec<(Vec<u8>,)> = sqlx::query_as(
            r#"
            SELECT file_path FROM files_baseline
            WHERE file_path >= ?1 AND file_path < ?2
            ORDER BY file_path
            "#,
        )
        .bind(lower)
        .bind(upper)
        .fetch_all(self.pool())
        .await
        .map_err(|e| FimError::Storage(format!("Failed to list baseline subtree: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(key,)| path_from_key(key))
            .filter(|path| path != dir && path.starts_with(dir))
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files_baseline")
            .fetch_one(self.pool())
            .await
            .map_err(|e| FimError::Storage(format!("Failed to count baseline: {}", e)))?;

        Ok(count.max(0) as u64)
    }
}

/// Half-open key range `[dir/, dir0)` covering everything below `dir`.
/// Keys compare byte-wise and the separator's last byte is never `0xff`, so
/// bumping it by one yields the first key past the subtree.
fn descendant_range(dir: &Path) -> Option<(Vec<u8>, Vec<u8>)> {
    let separator = path_key(Path::new(std::path::MAIN_SEPARATOR_STR));
    let mut lower = path_key(dir);
    if lower.is_empty() {
        return None;
    }
    if !lower.ends_with(&separator) {
        lower.extend_from_slice(&separator);
    }

    let mut upper = lower.clone();
    if let Some(last) = upper.last_mut() {
        *last += 1;
    }
    Some((lower, upper))
}

#[derive(sqlx::FromRow)]
struct BaselineRow {
    file_path: Vec<u8>,
    digest: Option<String>,
    size: i64,
    modified_at: Option<DateTime<Utc>>,
}

impl From<BaselineRow> for BaselineRecord {
    fn from(row: BaselineRow) -> Self {
        BaselineRecord {
            path: path_from_key(row.file_path),
            digest: row.digest,
            size: row.size.max(0) as u64,
            modified_at: row.modified_at,
        }
    }
}
