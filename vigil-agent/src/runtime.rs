use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_config::Config;
use vigil_core::alerts::{AlertDispatcher, AlertTransport, HttpAlertTransport, HttpInventoryTransport};
use vigil_core::database::{ChangeEventRepository, SqliteDatabase};
use vigil_core::engine::DiffEngine;
use vigil_core::fs_watch::FsWatchService;
use vigil_core::pipeline::{EventPipeline, PipelineStats};
use vigil_core::scan::{Reconciler, SweepReport};
use vigil_core::types::{AgentId, ChangeEventRecord};

use crate::identity::{IdentitySource, resolve_identity};

/// Everything needed to monitor: storage, identity, and the diff engine.
pub struct AgentRuntime {
    config: Config,
    db: SqliteDatabase,
    agent_id: AgentId,
    engine: Arc<DiffEngine>,
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("agent_id", &self.agent_id)
            .field("roots", &self.config.watch.roots)
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}

impl AgentRuntime {
    /// Open storage and resolve the identity. Fails before anything is
    /// watched when no identity is available.
    pub async fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let transport =
            HttpAlertTransport::new(config.alerts.endpoint.clone(), config.alerts.timeout())
                .context("failed to build alert transport")?;
        Self::bootstrap_with_transport(config, Arc::new(transport)).await
    }

    /// Same as [`bootstrap`](Self::bootstrap) with a caller-supplied alert
    /// transport. Inventory reporting still follows the configuration.
    pub async fn bootstrap_with_transport(
        config: Config,
        transport: Arc<dyn AlertTransport>,
    ) -> anyhow::Result<Self> {
        let db = SqliteDatabase::open(&config.storage.database_path)
            .await
            .context("failed to open the local database")?;

        let (agent_id, source) =
            resolve_identity(&config.agent, db.identity(), config.alerts.timeout())
                .await
                .context("cannot start without an agent identity")?;
        let origin = match source {
            IdentitySource::Configured => "configuration",
            IdentitySource::Stored => "local store",
            IdentitySource::Registered => "registration",
        };
        info!(agent_id = %agent_id, origin, "agent identity resolved");

        let mut alerts = AlertDispatcher::new(agent_id.clone(), transport);
        if let Some(endpoint) = &config.alerts.inventory_endpoint {
            let inventory = HttpInventoryTransport::new(endpoint.clone(), config.alerts.timeout())
                .context("failed to build inventory transport")?;
            info!(endpoint = %endpoint, "inventory reporting enabled");
            alerts = alerts.with_inventory(Arc::new(inventory));
        }
        let engine = Arc::new(DiffEngine::new(
            Arc::new(db.baseline().clone()),
            Arc::new(db.journal().clone()),
            alerts,
        ));

        Ok(Self {
            config,
            db,
            agent_id,
            engine,
        })
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }

    /// Watch and reconcile until `shutdown` resolves, then stop intake and
    /// drain running evaluations.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let (tx, rx) = mpsc::channel(self.config.pipeline.queue_capacity.max(1));
        let pipeline = EventPipeline::spawn(Arc::clone(&self.engine), self.config.pipeline, rx);

        let watch = FsWatchService::with_logging(self.config.watch.tuning.clone().into());
        let report = watch
            .start(self.config.watch.roots.clone(), tx.clone())
            .await
            .context("failed to start filesystem watch")?;
        if report.subscribed.is_empty() {
            warn!("no watch root could be subscribed; relying on periodic sweeps");
        }

        let reconcile_shutdown = CancellationToken::new();
        let reconciler = Reconciler::new(
            self.config.watch.roots.clone(),
            self.config.reconcile.interval(),
            Arc::new(self.db.baseline().clone()),
            tx,
        )
        .spawn(reconcile_shutdown.clone());

        info!(
            agent_id = %self.agent_id,
            roots = self.config.watch.roots.len(),
            interval_minutes = self.config.reconcile.interval_minutes,
            "monitoring started"
        );

        shutdown.await;
        info!("shutdown requested");

        watch.stop().await;
        reconcile_shutdown.cancel();
        if let Err(err) = reconciler.await {
            warn!(error = %err, "reconciler task ended abnormally");
        }
        let stats = pipeline.shutdown().await;
        self.db.close().await;

        Ok(stats)
    }

    /// One reconciliation sweep, evaluated to completion.
    pub async fn scan_once(self) -> anyhow::Result<(SweepReport, PipelineStats)> {
        let (tx, rx) = mpsc::channel(self.config.pipeline.queue_capacity.max(1));
        let pipeline = EventPipeline::spawn(Arc::clone(&self.engine), self.config.pipeline, rx);

        let reconciler = Reconciler::new(
            self.config.watch.roots.clone(),
            self.config.reconcile.interval(),
            Arc::new(self.db.baseline().clone()),
            tx,
        );
        let report = reconciler.reconcile_now().await;
        drop(reconciler);

        let stats = pipeline.join().await;
        self.db.close().await;
        let report = report.context("reconciliation sweep failed")?;
        Ok((report, stats))
    }
}

/// Newest first. The database is opened read-only and never created.
pub async fn recent_events(
    config: &Config,
    limit: u32,
) -> anyhow::Result<Vec<ChangeEventRecord>> {
    let db = SqliteDatabase::open_read_only(&config.storage.database_path)
        .await
        .context("failed to open the local database")?;
    let events = db
        .change_events()
        .list_recent(limit)
        .await
        .context("failed to read change events")?;
    db.close().await;
    Ok(events)
}
