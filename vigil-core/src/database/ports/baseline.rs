use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::BaselineRecord;

/// Durable table of last-known-good file states, keyed by absolute path.
#[async_trait]
pub trait BaselineRepository: Send + Sync {
    /// Point lookup by path.
    async fn lookup(&self, path: &Path) -> Result<Option<BaselineRecord>>;

    /// Insert or overwrite every field of the record for `record.path` in a
    /// single statement.
    async fn upsert(&self, record: &BaselineRecord) -> Result<()>;

    /// Returns whether a record existed. Removing an absent path is a no-op.
    async fn remove(&self, path: &Path) -> Result<bool>;

    /// Every tracked path.
    async fn list_paths(&self) -> Result<Vec<PathBuf>>;

    /// Tracked paths strictly below `dir`.
    async fn list_under(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Number of tracked paths.
    async fn count(&self) -> Result<u64>;
}
