//! SQLite-backed storage.

/// One repository per table.
pub mod repositories;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

use crate::error::{FimError, Result};

pub use repositories::{
    SqliteBaselineRepository, SqliteChangeEventRepository, SqliteChangeJournal,
    SqliteIdentityRepository,
};

const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Connection pool plus one repository per table.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    baseline: SqliteBaselineRepository,
    change_events: SqliteChangeEventRepository,
    journal: SqliteChangeJournal,
    identity: SqliteIdentityRepository,
}

impl fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl SqliteDatabase {
    /// Open (creating if needed) the database file and apply migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| {
                FimError::Storage(format!(
                    "failed to open database {}: {}",
                    path.display(),
                    e
                ))
            })?;

        info!(path = %path.display(), "database opened");

        let db = Self::from_pool(pool);
        db.initialize_schema().await?;
        Ok(db)
    }

    /// Open an existing database without creating it or touching the
    /// schema. Writes through the returned handle fail.
    pub async fn open_read_only(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .read_only(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| {
                FimError::Storage(format!(
                    "failed to open database {} read-only: {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(Self::from_pool(pool))
    }

    /// Private in-memory database. A single connection is kept alive for the
    /// lifetime of the pool so the data survives between queries.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                FimError::Storage(format!("failed to open in-memory database: {}", e))
            })?;

        let db = Self::from_pool(pool);
        db.initialize_schema().await?;
        Ok(db)
    }

    /// Wrap an existing pool. The schema is not migrated.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            baseline: SqliteBaselineRepository::new(pool.clone()),
            change_events: SqliteChangeEventRepository::new(pool.clone()),
            journal: SqliteChangeJournal::new(pool.clone()),
            identity: SqliteIdentityRepository::new(pool.clone()),
            pool,
        }
    }

    /// Apply any pending migrations.
    pub async fn initialize_schema(&self) -> Result<()> {
        crate::MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| FimError::Storage(format!("Migration failed: {}", e)))
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Baseline table.
    pub fn baseline(&self) -> &SqliteBaselineRepository {
        &self.baseline
    }

    /// Event log, for reads and standalone appends.
    pub fn change_events(&self) -> &SqliteChangeEventRepository {
        &self.change_events
    }

    /// Transactional writer for baseline mutations and their events.
    pub fn journal(&self) -> &SqliteChangeJournal {
        &self.journal
    }

    /// Stored agent identity.
    pub fn identity(&self) -> &SqliteIdentityRepository {
        &self.identity
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
