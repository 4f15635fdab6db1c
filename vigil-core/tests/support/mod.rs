#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use tokio::net::TcpListener;
use url::Url;
use vigil_core::alerts::{AlertDispatcher, AlertTransport};
use vigil_core::database::SqliteDatabase;
use vigil_core::engine::DiffEngine;
use vigil_core::error::FimError;
use vigil_core::types::{AgentId, AlertPayload, ChangeKind, InventoryPayload};

pub const AGENT_ID: &str = "agent-test";

/// Transport that keeps every payload and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    payloads: Mutex<Vec<AlertPayload>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn payloads(&self) -> Vec<AlertPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<ChangeKind> {
        self.payloads().iter().map(|p| p.change_type).collect()
    }
}

#[async_trait]
impl AlertTransport for RecordingTransport {
    async fn deliver(&self, payload: &AlertPayload) -> vigil_core::Result<()> {
        self.payloads.lock().unwrap().push(payload.clone());
        if self.fail {
            return Err(FimError::Delivery("collector unreachable".into()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub db: SqliteDatabase,
    pub engine: Arc<DiffEngine>,
    pub transport: Arc<RecordingTransport>,
}

pub async fn harness() -> Result<Harness> {
    harness_with(RecordingTransport::default()).await
}

pub async fn harness_with(transport: RecordingTransport) -> Result<Harness> {
    let db = SqliteDatabase::in_memory().await?;
    let transport = Arc::new(transport);
    let engine = engine_for(&db, transport.clone())?;
    Ok(Harness {
        db,
        engine,
        transport,
    })
}

pub fn engine_for(
    db: &SqliteDatabase,
    transport: Arc<dyn AlertTransport>,
) -> Result<Arc<DiffEngine>> {
    let alerts = AlertDispatcher::new(AgentId::new(AGENT_ID)?, transport);
    Ok(Arc::new(DiffEngine::new(
        Arc::new(db.baseline().clone()),
        Arc::new(db.journal().clone()),
        alerts,
    )))
}

/// In-process collector bound to an ephemeral port.
pub struct Collector {
    pub url: Url,
    pub inventory_url: Url,
    pub received: Arc<Mutex<Vec<AlertPayload>>>,
    pub inventory: Arc<Mutex<Vec<InventoryPayload>>>,
}

pub async fn spawn_collector(status: StatusCode) -> Result<Collector> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let inventory = Arc::new(Mutex::new(Vec::new()));
    let files = Router::new()
        .route("/api/files", post(receive_inventory))
        .with_state(inventory.clone());
    let app = Router::new()
        .route("/api/alerts", post(receive))
        .with_state((received.clone(), status))
        .merge(files);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(Collector {
        url: Url::parse(&format!("http://{addr}/api/alerts"))?,
        inventory_url: Url::parse(&format!("http://{addr}/api/files"))?,
        received,
        inventory,
    })
}

async fn receive_inventory(
    State(inventory): State<Arc<Mutex<Vec<InventoryPayload>>>>,
    Json(payload): Json<InventoryPayload>,
) -> StatusCode {
    inventory.lock().unwrap().push(payload);
    StatusCode::CREATED
}

async fn receive(
    State((received, status)): State<(Arc<Mutex<Vec<AlertPayload>>>, StatusCode)>,
    Json(payload): Json<AlertPayload>,
) -> (StatusCode, Json<serde_json::Value>) {
    received.lock().unwrap().push(payload);
    if status.is_success() {
        (status, Json(serde_json::json!({ "status": "ok" })))
    } else {
        (status, Json(serde_json::json!({ "error": "rejected by test collector" })))
    }
}
