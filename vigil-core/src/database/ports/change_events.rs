use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChangeEvent, ChangeEventRecord};

/// Append-only audit log of classified changes.
#[async_trait]
pub trait ChangeEventRepository: Send + Sync {
    /// Returns the id assigned to the appended row.
    async fn append(&self, event: &ChangeEvent) -> Result<i64>;

    /// Newest first.
    async fn list_recent(&self, limit: u32) -> Result<Vec<ChangeEventRecord>>;
}
