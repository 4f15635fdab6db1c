use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BaselineRecord, ChangeEvent};

/// Baseline mutations paired with the audit row that describes them.
///
/// Both writes commit together or not at all, so the event log never misses
/// a change the baseline already reflects.
#[async_trait]
pub trait ChangeJournal: Send + Sync {
    /// Upsert `record` and append `event`. Returns the new event id.
    async fn record_present(&self, record: &BaselineRecord, event: &ChangeEvent) -> Result<i64>;

    /// Delete the baseline row for `event.path` and append `event`. When no
    /// row existed nothing is written and `None` is returned.
    async fn record_removed(&self, event: &ChangeEvent) -> Result<Option<i64>>;
}
