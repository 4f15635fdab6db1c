//! # Vigil Core
//!
//! Monitoring and diff engine for the Vigil file integrity agent.
//!
//! ## Overview
//!
//! - **Watching**: [`fs_watch`] subscribes to OS notifications for each root
//!   and enumerates pre-existing files on start
//! - **Reconciliation**: [`scan::Reconciler`] re-walks the roots on a fixed
//!   interval to catch missed notifications
//! - **Hashing**: [`hasher`] streams file content through SHA-256 in fixed
//!   chunks
//! - **Classification**: [`engine::DiffEngine`] compares each file against
//!   the stored baseline and records ADDED / MODIFIED / REMOVED
//! - **Persistence**: [`database`] keeps the baseline, the append-only change
//!   log, and the agent identity in SQLite
//! - **Alerts**: [`alerts`] posts one JSON payload per change to the
//!   collector, best effort
//!
//! Raw events from the watcher and the reconciler share one queue drained by
//! [`pipeline::EventPipeline`], a bounded worker pool.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio::sync::mpsc;
//! use vigil_core::alerts::{AlertDispatcher, HttpAlertTransport};
//! use vigil_core::config::PipelineConfig;
//! use vigil_core::database::SqliteDatabase;
//! use vigil_core::engine::DiffEngine;
//! use vigil_core::pipeline::EventPipeline;
//! use vigil_core::types::{AgentId, RawEvent};
//!
//! async fn run() -> vigil_core::Result<()> {
//!     let db = SqliteDatabase::open("vigil.db".as_ref()).await?;
//!     let transport = HttpAlertTransport::new(
//!         "http://localhost:7000/api/alerts".parse().unwrap(),
//!         std::time::Duration::from_secs(10),
//!     )?;
//!     let alerts = AlertDispatcher::new(AgentId::new("agent-1")?, Arc::new(transport));
//!     let engine = DiffEngine::new(
//!         Arc::new(db.baseline().clone()),
//!         Arc::new(db.journal().clone()),
//!         alerts,
//!     );
//!
//!     let (tx, rx) = mpsc::channel(1024);
//!     let pipeline = EventPipeline::spawn(Arc::new(engine), PipelineConfig::default(), rx);
//!     tx.send(RawEvent::created("/etc/hosts")).await.ok();
//!     drop(tx);
//!     pipeline.join().await;
//!     Ok(())
//! }
//! ```

pub mod alerts;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod fs_watch;
pub mod hasher;
pub mod pipeline;
pub mod scan;
pub mod types;

pub use error::{FimError, Result};

/// Embedded schema migrations for the SQLite store.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
