//! Bounded worker pool between the raw event channel and the diff engine.
//!
//! The watcher and the reconciler share one `mpsc` channel. Each event is
//! evaluated on its own task, at most `max_concurrent_evaluations` at a time.
//! Once an evaluation starts it runs to completion; shutdown only stops
//! intake and then waits for the running tasks.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::engine::{Classification, DiffEngine};
use crate::error::FimError;
use crate::types::RawEvent;

/// Totals accumulated over the lifetime of a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Files that entered the baseline.
    pub added: u64,
    /// Files whose digest changed.
    pub modified: u64,
    /// Tracked files that went away.
    pub removed: u64,
    /// Evaluations that matched the baseline.
    pub unchanged: u64,
    /// Evaluations of paths that are not tracked regular files.
    pub untracked: u64,
    /// Evaluations that returned an error; the baseline kept its prior state.
    pub failed: u64,
    /// Queued events discarded because shutdown arrived first.
    pub dropped: u64,
}

impl PipelineStats {
    /// Every event that reached the engine.
    pub fn evaluated(&self) -> u64 {
        self.added + self.modified + self.removed + self.unchanged + self.untracked + self.failed
    }

    /// ADDED + MODIFIED + REMOVED.
    pub fn changes(&self) -> u64 {
        self.added + self.modified + self.removed
    }

    fn record(&mut self, outcome: std::result::Result<Classification, FimError>) {
        match outcome {
            Ok(Classification::Added { .. }) => self.added += 1,
            Ok(Classification::Modified { .. }) => self.modified += 1,
            Ok(Classification::Removed { .. }) => self.removed += 1,
            Ok(Classification::Unchanged) => self.unchanged += 1,
            Ok(Classification::Untracked) => self.untracked += 1,
            Err(_) => self.failed += 1,
        }
    }

    fn record_join(&mut self, joined: std::result::Result<Outcome, JoinError>) {
        match joined {
            Ok(outcome) => self.record(outcome),
            Err(err) => {
                error!(error = %err, "evaluation task panicked");
                self.failed += 1;
            }
        }
    }
}

type Outcome = std::result::Result<Classification, FimError>;

/// Entry point for the worker pool.
pub struct EventPipeline;

impl EventPipeline {
    /// Start consuming `rx`. The pipeline ends when every sender is dropped
    /// or when [`PipelineHandle::shutdown`] is called.
    pub fn spawn(
        engine: Arc<DiffEngine>,
        config: PipelineConfig,
        rx: mpsc::Receiver<RawEvent>,
    ) -> PipelineHandle {
        let shutdown = CancellationToken::new();
        let permits = Arc::new(Semaphore::new(config.max_concurrent_evaluations.max(1)));
        let task = tokio::spawn(run(engine, permits, rx, shutdown.clone()));
        PipelineHandle { shutdown, task }
    }
}

/// Running pipeline; dropping it leaves the pipeline running.
#[derive(Debug)]
pub struct PipelineHandle {
    shutdown: CancellationToken,
    task: JoinHandle<PipelineStats>,
}

impl PipelineHandle {
    /// Token that stops intake when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop taking new events, wait for in-flight evaluations, and return the
    /// totals.
    pub async fn shutdown(self) -> PipelineStats {
        self.shutdown.cancel();
        self.join().await
    }

    /// Wait for the pipeline to finish on its own (all senders dropped).
    pub async fn join(self) -> PipelineStats {
        match self.task.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "event pipeline task failed");
                PipelineStats::default()
            }
        }
    }
}

async fn run(
    engine: Arc<DiffEngine>,
    permits: Arc<Semaphore>,
    mut rx: mpsc::Receiver<RawEvent>,
    shutdown: CancellationToken,
) -> PipelineStats {
    let mut stats = PipelineStats::default();
    let mut tasks: JoinSet<Outcome> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                stats.record_join(joined);
            }
            next = rx.recv() => {
                let Some(event) = next else { break };

                let permit = tokio::select! {
                    _ = shutdown.cancelled() => {
                        stats.dropped += 1;
                        break;
                    }
                    permit = Arc::clone(&permits).acquire_owned() => permit,
                };
                let Ok(permit) = permit else {
                    stats.dropped += 1;
                    break;
                };

                let engine = Arc::clone(&engine);
                tasks.spawn(async move {
                    let outcome = evaluate(&engine, &event).await;
                    drop(permit);
                    outcome
                });
            }
        }
    }

    rx.close();
    while rx.try_recv().is_ok() {
        stats.dropped += 1;
    }
    if stats.dropped > 0 {
        info!(dropped = stats.dropped, "discarded queued events at shutdown");
    }

    let in_flight = tasks.len();
    if in_flight > 0 {
        debug!(in_flight, "waiting for running evaluations");
    }
    while let Some(joined) = tasks.join_next().await {
        stats.record_join(joined);
    }

    info!(
        evaluated = stats.evaluated(),
        changes = stats.changes(),
        failed = stats.failed,
        "event pipeline stopped"
    );
    stats
}

async fn evaluate(engine: &DiffEngine, event: &RawEvent) -> Outcome {
    let outcome = engine.evaluate(event).await;
    match &outcome {
        Ok(classification) => debug!(
            path = %event.path.display(),
            raw = %event.kind,
            outcome = classification.label(),
            "evaluated"
        ),
        Err(err @ FimError::FileUnreadable { .. }) => {
            warn!(raw = %event.kind, error = %err, "skipping unreadable file this round");
        }
        Err(err) => error!(
            path = %event.path.display(),
            raw = %event.kind,
            error = %err,
            "evaluation failed"
        ),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::tempdir;

    use super::*;
    use crate::alerts::{AlertDispatcher, AlertTransport};
    use crate::database::SqliteDatabase;
    use crate::database::ports::baseline::BaselineRepository;
    use crate::database::ports::ChangeEventRepository;
    use crate::error::Result;
    use crate::types::{AgentId, AlertPayload};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<AlertPayload>>,
    }

    #[async_trait]
    impl AlertTransport for Recorder {
        async fn deliver(&self, payload: &AlertPayload) -> Result<()> {
            self.seen.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    async fn engine(db: &SqliteDatabase) -> Arc<DiffEngine> {
        let alerts = AlertDispatcher::new(
            AgentId::new("agent-1").unwrap(),
            Arc::new(Recorder::default()),
        );
        Arc::new(DiffEngine::new(
            Arc::new(db.baseline().clone()),
            Arc::new(db.journal().clone()),
            alerts,
        ))
    }

    #[tokio::test]
    async fn drains_channel_until_senders_drop() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        let (tx, rx) = mpsc::channel(16);
        let handle = EventPipeline::spawn(engine(&db).await, PipelineConfig::default(), rx);

        for name in ["a.txt", "b.txt", "c.txt"] {
            let path = dir.path().join(name);
            std::fs::write(&path, name).unwrap();
            tx.send(RawEvent::created(path)).await.unwrap();
        }
        tx.send(RawEvent::created(dir.path().join("a.txt")))
            .await
            .unwrap();
        drop(tx);

        let stats = handle.join().await;
        assert_eq!(stats.added, 3);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.dropped, 0);
        assert_eq!(db.baseline().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn removal_of_unknown_path_does_not_stop_the_pipeline() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "ok").unwrap();

        let (tx, rx) = mpsc::channel(16);
        let handle = EventPipeline::spawn(
            engine(&db).await,
            PipelineConfig {
                max_concurrent_evaluations: 1,
                ..Default::default()
            },
            rx,
        );
        tx.send(RawEvent::removed(dir.path().join("never-existed")))
            .await
            .unwrap();
        tx.send(RawEvent::created(good.clone())).await.unwrap();
        drop(tx);

        let stats = handle.join().await;
        assert_eq!(stats.untracked, 1);
        assert_eq!(stats.added, 1);
        assert!(db.baseline().lookup(&good).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn shutdown_returns_with_sender_still_open() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let (tx, rx) = mpsc::channel::<RawEvent>(4);
        let handle = EventPipeline::spawn(engine(&db).await, PipelineConfig::default(), rx);

        let stats = tokio::time::timeout(std::time::Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown should not wait for senders");
        assert_eq!(stats.evaluated(), 0);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn storage_failure_counts_and_later_events_still_run() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_events BEFORE INSERT ON change_events \
             WHEN CAST(NEW.file_path AS TEXT) LIKE '%poison%' \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let dir = tempdir().unwrap();
        let poison = dir.path().join("poison.txt");
        let good = dir.path().join("good.txt");
        std::fs::write(&poison, "x").unwrap();
        std::fs::write(&good, "y").unwrap();

        let (tx, rx) = mpsc::channel(16);
        let handle = EventPipeline::spawn(
            engine(&db).await,
            PipelineConfig {
                max_concurrent_evaluations: 1,
                ..Default::default()
            },
            rx,
        );
        tx.send(RawEvent::created(poison.clone())).await.unwrap();
        tx.send(RawEvent::created(good.clone())).await.unwrap();
        drop(tx);

        let stats = handle.join().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.added, 1);
        assert!(db.baseline().lookup(&poison).await.unwrap().is_none());
        assert!(db.baseline().lookup(&good).await.unwrap().is_some());
        let events = db.change_events().list_recent(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, good);
    }
}
