use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, spawn_blocking};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::enumerate::enumerate_roots;
use crate::config::MAX_RECONCILE_INTERVAL_MINUTES;
use crate::database::ports::BaselineRepository;
use crate::error::{FimError, Result};
use crate::types::RawEvent;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files found on disk and queued for re-evaluation.
    pub existing: usize,
    /// Tracked paths that are gone or no longer regular files, queued so the
    /// engine removes them.
    pub vanished: usize,
}

/// Re-enumerates the watched roots on a fixed interval and feeds every file
/// into the same queue the watcher uses.
pub struct Reconciler {
    roots: Vec<PathBuf>,
    interval: Duration,
    baseline: Arc<dyn BaselineRepository>,
    sink: mpsc::Sender<RawEvent>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("roots", &self.roots)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Sweeps `roots`, comparing against `baseline`, and queues into `sink`.
    pub fn new(
        roots: Vec<PathBuf>,
        interval: Duration,
        baseline: Arc<dyn BaselineRepository>,
        sink: mpsc::Sender<RawEvent>,
    ) -> Self {
        Self {
            roots,
            interval,
            baseline,
            sink,
        }
    }

    /// Run one sweep now.
    pub async fn reconcile_now(&self) -> Result<SweepReport> {
        let roots = self.roots.clone();
        let existing = spawn_blocking(move || enumerate_roots(&roots))
            .await
            .map_err(|e| FimError::Internal(format!("enumeration task failed: {e}")))?;

        let mut report = SweepReport::default();
        let seen: HashSet<PathBuf> = existing.iter().cloned().collect();
        for path in existing {
            self.send(RawEvent::reconcile(path)).await?;
            report.existing += 1;
        }

        // Files deleted while nobody was listening only show up by comparing
        // against the baseline.
        match self.baseline.list_paths().await {
            Ok(tracked) => {
                for path in tracked {
                    if seen.contains(&path) || !self.roots.iter().any(|r| path.starts_with(r)) {
                        continue;
                    }
                    let still_a_file = matches!(
                        tokio::fs::symlink_metadata(&path).await,
                        Ok(meta) if meta.is_file()
                    );
                    if still_a_file {
                        continue;
                    }
                    self.send(RawEvent::reconcile(path)).await?;
                    report.vanished += 1;
                }
            }
            Err(err) => {
                warn!(error = %err, "could not list baseline; vanished files wait for the next sweep");
            }
        }

        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` fires. The first sweep runs one
    /// interval after start.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let max = Duration::from_secs(MAX_RECONCILE_INTERVAL_MINUTES * 60);
            let period = self.interval.clamp(Duration::from_secs(1), max);
            let start = Instant::now()
                .checked_add(period)
                .unwrap_or_else(Instant::now);
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                info!("periodic reconciliation started");
                match self.reconcile_now().await {
                    Ok(report) => info!(
                        existing = report.existing,
                        vanished = report.vanished,
                        "periodic reconciliation queued"
                    ),
                    Err(err) => {
                        warn!(error = %err, "periodic reconciliation aborted");
                        if self.sink.is_closed() {
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn send(&self, event: RawEvent) -> Result<()> {
        self.sink
            .send(event)
            .await
            .map_err(|_| FimError::Internal("event pipeline is closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteDatabase;
    use crate::types::{BaselineRecord, RawEventKind};
    use tempfile::tempdir;

    #[tokio::test]
    async fn sweep_queues_existing_and_vanished_files() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let present = root.join("present.txt");
        std::fs::write(&present, "here").unwrap();

        let gone = root.join("gone.txt");
        let outside = PathBuf::from("/elsewhere/untouched.txt");
        for path in [&gone, &outside] {
            db.baseline()
                .upsert(&BaselineRecord {
                    path: path.clone(),
                    digest: Some("d".into()),
                    size: 1,
                    modified_at: None,
                })
                .await
                .unwrap();
        }

        let (tx, mut rx) = mpsc::channel(16);
        let reconciler = Reconciler::new(
            vec![root],
            Duration::from_secs(60),
            Arc::new(db.baseline().clone()),
            tx,
        );

        let report = reconciler.reconcile_now().await.unwrap();
        assert_eq!(report, SweepReport { existing: 1, vanished: 1 });

        let mut queued = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.kind, RawEventKind::Reconcile);
            queued.push(event.path);
        }
        queued.sort();
        let mut expected = vec![gone, present];
        expected.sort();
        assert_eq!(queued, expected);
    }

    #[tokio::test]
    async fn closed_pipeline_aborts_the_sweep() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let reconciler = Reconciler::new(
            vec![dir.path().to_path_buf()],
            Duration::from_secs(60),
            Arc::new(db.baseline().clone()),
            tx,
        );

        assert!(reconciler.reconcile_now().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tracked_file_turned_symlink_is_queued() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let path = root.join("sudoers");
        std::os::unix::fs::symlink("/nonexistent/target", &path).unwrap();
        db.baseline()
            .upsert(&BaselineRecord {
                path: path.clone(),
                digest: Some("d".into()),
                size: 1,
                modified_at: None,
            })
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let reconciler = Reconciler::new(
            vec![root],
            Duration::from_secs(60),
            Arc::new(db.baseline().clone()),
            tx,
        );

        let report = reconciler.reconcile_now().await.unwrap();
        assert_eq!(report, SweepReport { existing: 0, vanished: 1 });
        assert_eq!(rx.try_recv().unwrap().path, path);
    }

    #[tokio::test]
    async fn oversized_interval_does_not_panic() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let reconciler = Reconciler::new(
            Vec::new(),
            Duration::MAX,
            Arc::new(db.baseline().clone()),
            tx,
        );

        let shutdown = CancellationToken::new();
        let task = reconciler.spawn(shutdown.clone());
        tokio::task::yield_now().await;
        shutdown.cancel();
        task.await.unwrap();
    }
}
