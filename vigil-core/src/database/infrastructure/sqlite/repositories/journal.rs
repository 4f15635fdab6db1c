use async_trait::async_trait;
use sqlx::SqlitePool;

use super::baseline::{delete_row, upsert_row};
use super::change_events::insert_event;
use crate::database::ports::journal::ChangeJournal;
use crate::error::{FimError, Result};
use crate::types::{BaselineRecord, ChangeEvent};

/// Runs each baseline mutation and its event append in one transaction.
#[derive(Clone, Debug)]
pub struct SqliteChangeJournal {
    pool: SqlitePool,
}

impl SqliteChangeJournal {
    /// Wrap a pool whose schema is already migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn tx_error(stage: &str, err: sqlx::Error) -> FimError {
    FimError::Storage(format!("Failed to {} change transaction: {}", stage, err))
}

#[async_trait]
impl ChangeJournal for SqliteChangeJournal {
    async fn record_present(&self, record: &BaselineRecord, event: &ChangeEvent) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(|e| tx_error("begin", e))?;

        let written = async {
            upsert_row(&mut *tx, record).await?;
            insert_event(&mut *tx, event).await
        }
        .await;

        match written {
            Ok(id) => {
                tx.commit().await.map_err(|e| tx_error("commit", e))?;
                Ok(id)
            }
            Err(err) => {
                tx.rollback().await.map_err(|e| tx_error("roll back", e))?;
                Err(err)
            }
        }
    }

    async fn record_removed(&self, event: &ChangeEvent) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await.map_err(|e| tx_error("begin", e))?;

        let written = async {
            if !delete_row(&mut *tx, &event.path).await? {
                return Ok(None);
            }
            insert_event(&mut *tx, event).await.map(Some)
        }
        .await;

        match written {
            Ok(Some(id)) => {
                tx.commit().await.map_err(|e| tx_error("commit", e))?;
                Ok(Some(id))
            }
            Ok(None) => {
                tx.rollback().await.map_err(|e| tx_error("roll back", e))?;
                Ok(None)
            }
            Err(err) => {
                tx.rollback().await.map_err(|e| tx_error("roll back", e))?;
                Err(err)
            }
        }
    }
}
