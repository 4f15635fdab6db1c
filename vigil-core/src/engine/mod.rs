//! Baseline comparison state machine.
//!
//! Every raw event, whether it came from the live watcher or from a periodic
//! sweep, ends up in [`DiffEngine::evaluate`]. Classification depends only on
//! whether the path exists and whether its digest matches the baseline, so a
//! change is classified the same way no matter who noticed it.
//!
//! Evaluations of the same path are serialized through [`PathLocks`]; the
//! hash is computed while the lock is held, so a stale digest can never be
//! written over a fresher one.

/// Keyed async mutexes.
pub mod path_locks;

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::alerts::AlertDispatcher;
use crate::database::ports::{BaselineRepository, ChangeJournal};
use crate::error::{FimError, Result};
use crate::hasher::{ContentHasher, HashOutcome};
use crate::types::{BaselineRecord, ChangeEvent, ChangeKind, RawEvent, RawEventKind};

pub use path_locks::{PathGuard, PathLocks};

/// Result of evaluating one raw event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// First sighting of a regular file.
    Added {
        /// Digest now stored in the baseline.
        digest: String,
    },
    /// Digest differs from the baseline.
    Modified {
        /// Previous baseline digest.
        old_digest: Option<String>,
        /// Digest now stored in the baseline.
        new_digest: String,
    },
    /// A tracked path disappeared or stopped being a regular file.
    Removed {
        /// Digest the baseline held before the row was dropped.
        old_digest: Option<String>,
    },
    /// Digest matches the baseline. Nothing was written.
    Unchanged,
    /// Nothing tracked at this path and nothing to start tracking.
    Untracked,
}

impl Classification {
    /// Event-log kind, `None` for outcomes that wrote nothing.
    pub fn change_kind(&self) -> Option<ChangeKind> {
        match self {
            Classification::Added { .. } => Some(ChangeKind::Added),
            Classification::Modified { .. } => Some(ChangeKind::Modified),
            Classification::Removed { .. } => Some(ChangeKind::Removed),
            Classification::Unchanged | Classification::Untracked => None,
        }
    }

    /// Lowercase name for logs and counters.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Added { .. } => "added",
            Classification::Modified { .. } => "modified",
            Classification::Removed { .. } => "removed",
            Classification::Unchanged => "unchanged",
            Classification::Untracked => "untracked",
        }
    }
}

/// Size and mtime read before hashing.
#[derive(Debug, Clone, Copy)]
struct FileStat {
    size: u64,
    modified_at: Option<DateTime<Utc>>,
}

enum PathState {
    File(FileStat),
    NotAFile,
    Missing,
}

async fn inspect(path: &Path) -> Result<PathState> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(PathState::File(FileStat {
            size: meta.len(),
            modified_at: meta.modified().ok().map(DateTime::<Utc>::from),
        })),
        Ok(_) => Ok(PathState::NotAFile),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(PathState::Missing),
        Err(source) => Err(FimError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Classifies raw events against the baseline and applies the outcome.
pub struct DiffEngine {
    baseline: Arc<dyn BaselineRepository>,
    journal: Arc<dyn ChangeJournal>,
    alerts: AlertDispatcher,
    hasher: ContentHasher,
    locks: PathLocks,
}

impl fmt::Debug for DiffEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffEngine")
            .field("alerts", &self.alerts)
            .field("hasher", &self.hasher)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl DiffEngine {
    /// `baseline` serves lookups; every mutation goes through `journal`.
    pub fn new(
        baseline: Arc<dyn BaselineRepository>,
        journal: Arc<dyn ChangeJournal>,
        alerts: AlertDispatcher,
    ) -> Self {
        Self {
            baseline,
            journal,
            alerts,
            hasher: ContentHasher::default(),
            locks: PathLocks::new(),
        }
    }

    /// Replace the default streaming hasher.
    pub fn with_hasher(mut self, hasher: ContentHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Read side of the baseline.
    pub fn baseline(&self) -> &Arc<dyn BaselineRepository> {
        &self.baseline
    }

    /// Write side: baseline mutations with their audit rows.
    pub fn journal(&self) -> &Arc<dyn ChangeJournal> {
        &self.journal
    }

    /// Classify one raw event and apply the resulting baseline mutation,
    /// event-log append, and alert.
    ///
    /// Errors are limited to this path: an unreadable file or a storage
    /// failure aborts this evaluation and leaves the baseline as it was.
    pub async fn evaluate(&self, event: &RawEvent) -> Result<Classification> {
        let guard = self.locks.lock(&event.path).await;

        if event.kind == RawEventKind::Removed {
            let outcome = self.remove_tracked(&event.path).await?;
            drop(guard);
            if outcome == Classification::Untracked {
                // The path may have been a directory holding tracked files.
                self.sweep_descendants(&event.path).await?;
            }
            return Ok(outcome);
        }

        self.classify_locked(&event.path).await
    }

    /// Caller must hold the path lock.
    async fn classify_locked(&self, path: &Path) -> Result<Classification> {
        let stat = match inspect(path).await? {
            PathState::File(stat) => stat,
            PathState::Missing => return self.remove_tracked(path).await,
            PathState::NotAFile => {
                if self.baseline.lookup(path).await?.is_some() {
                    warn!(path = %path.display(), "tracked file replaced by a non-regular file");
                    return self.remove_tracked(path).await;
                }
                debug!(path = %path.display(), "ignoring non-regular file");
                return Ok(Classification::Untracked);
            }
        };

        let digest = match self.hasher.hash(path).await? {
            HashOutcome::Digest(digest) => digest,
            // Vanished between the stat and the open.
            HashOutcome::NotFound => return self.remove_tracked(path).await,
        };

        match self.baseline.lookup(path).await? {
            None => {
                let record = self.commit(path, ChangeKind::Added, &digest, stat).await?;
                info!(path = %path.display(), digest = %digest, "ADDED");
                self.alerts.report_inventory(&record).await;
                self.alerts
                    .dispatch(path, ChangeKind::Added, None, Some(digest.clone()))
                    .await;
                Ok(Classification::Added { digest })
            }
            Some(record) if record.digest.as_deref() == Some(digest.as_str()) => {
                debug!(path = %path.display(), "unchanged");
                Ok(Classification::Unchanged)
            }
            Some(record) => {
                let updated = self
                    .commit(path, ChangeKind::Modified, &digest, stat)
                    .await?;
                info!(
                    path = %path.display(),
                    old_digest = record.digest.as_deref().unwrap_or("-"),
                    new_digest = %digest,
                    "MODIFIED"
                );
                self.alerts.report_inventory(&updated).await;
                self.alerts
                    .dispatch(
                        path,
                        ChangeKind::Modified,
                        record.digest.clone(),
                        Some(digest.clone()),
                    )
                    .await;
                Ok(Classification::Modified {
                    old_digest: record.digest,
                    new_digest: digest,
                })
            }
        }
    }

    /// Baseline row and audit record, in one transaction.
    async fn commit(
        &self,
        path: &Path,
        kind: ChangeKind,
        digest: &str,
        stat: FileStat,
    ) -> Result<BaselineRecord> {
        let record = BaselineRecord {
            path: path.to_path_buf(),
            digest: Some(digest.to_string()),
            size: stat.size,
            modified_at: stat.modified_at,
        };
        self.journal
            .record_present(&record, &ChangeEvent::now(path, kind))
            .await?;
        Ok(record)
    }

    /// Caller must hold the path lock.
    async fn remove_tracked(&self, path: &Path) -> Result<Classification> {
        let Some(record) = self.baseline.lookup(path).await? else {
            debug!(path = %path.display(), "removal of untracked path");
            return Ok(Classification::Untracked);
        };

        let event = ChangeEvent::now(path, ChangeKind::Removed);
        if self.journal.record_removed(&event).await?.is_none() {
            debug!(path = %path.display(), "baseline row already gone");
            return Ok(Classification::Untracked);
        }
        info!(path = %path.display(), "REMOVED");
        self.alerts
            .dispatch(path, ChangeKind::Removed, record.digest.clone(), None)
            .await;

        Ok(Classification::Removed {
            old_digest: record.digest,
        })
    }

    /// Re-check every tracked path below `dir`. Files that still exist keep
    /// their normal classification; the rest are removed.
    async fn sweep_descendants(&self, dir: &Path) -> Result<()> {
        let children: Vec<PathBuf> = self.baseline.list_under(dir).await?;
        for child in children {
            let _guard = self.locks.lock(&child).await;
            if let Err(err) = self.classify_locked(&child).await {
                warn!(path = %child.display(), error = %err, "descendant re-check failed");
            }
        }
        Ok(())
    }
}
