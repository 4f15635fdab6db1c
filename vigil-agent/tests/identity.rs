use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;
use vigil_agent::identity::{IdentitySource, resolve_identity};
use vigil_config::AgentConfig;
use vigil_core::FimError;
use vigil_core::database::{IdentityRepository, SqliteDatabase};
use vigil_core::types::AgentId;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct Registry {
    status: StatusCode,
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn register(
    State(registry): State<Registry>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    registry.requests.lock().unwrap().push(body);
    if registry.status.is_success() {
        (registry.status, Json(json!({ "agentId": "agent-42" })))
    } else {
        (registry.status, Json(json!({ "error": "registry offline" })))
    }
}

async fn spawn_registry(status: StatusCode) -> (Url, Arc<Mutex<Vec<Value>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/agents/register", post(register))
        .with_state(Registry {
            status,
            requests: requests.clone(),
        });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let url = Url::parse(&format!("http://{addr}/api/agents/register")).unwrap();
    (url, requests)
}

#[tokio::test]
async fn configured_id_takes_precedence() {
    let db = SqliteDatabase::in_memory().await.unwrap();
    db.identity().store(&AgentId::new("stored").unwrap()).await.unwrap();

    let agent = AgentConfig {
        agent_id: Some("configured".into()),
        registration_url: None,
    };
    let (id, source) = resolve_identity(&agent, db.identity(), TIMEOUT).await.unwrap();
    assert_eq!(id.as_str(), "configured");
    assert_eq!(source, IdentitySource::Configured);
}

#[tokio::test]
async fn stored_id_skips_registration() {
    let db = SqliteDatabase::in_memory().await.unwrap();
    db.identity().store(&AgentId::new("stored").unwrap()).await.unwrap();
    let (url, requests) = spawn_registry(StatusCode::OK).await;

    let agent = AgentConfig {
        agent_id: None,
        registration_url: Some(url),
    };
    let (id, source) = resolve_identity(&agent, db.identity(), TIMEOUT).await.unwrap();
    assert_eq!(id.as_str(), "stored");
    assert_eq!(source, IdentitySource::Stored);
    assert!(requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn registered_id_is_persisted() {
    let db = SqliteDatabase::in_memory().await.unwrap();
    let (url, requests) = spawn_registry(StatusCode::OK).await;

    let agent = AgentConfig {
        agent_id: None,
        registration_url: Some(url),
    };
    let (id, source) = resolve_identity(&agent, db.identity(), TIMEOUT).await.unwrap();
    assert_eq!(id.as_str(), "agent-42");
    assert_eq!(source, IdentitySource::Registered);

    let stored = db.identity().load().await.unwrap();
    assert_eq!(stored.map(|id| id.as_str().to_string()), Some("agent-42".into()));

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    for field in ["name", "os", "ip"] {
        assert!(requests[0][field].is_string(), "missing {field}");
    }
}

#[tokio::test]
async fn no_identity_source_is_fatal() {
    let db = SqliteDatabase::in_memory().await.unwrap();
    let err = resolve_identity(&AgentConfig::default(), db.identity(), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, FimError::MissingIdentity));
}

#[tokio::test]
async fn rejected_registration_is_fatal_and_stores_nothing() {
    let db = SqliteDatabase::in_memory().await.unwrap();
    let (url, _) = spawn_registry(StatusCode::INTERNAL_SERVER_ERROR).await;

    let agent = AgentConfig {
        agent_id: None,
        registration_url: Some(url),
    };
    let err = resolve_identity(&agent, db.identity(), TIMEOUT).await.unwrap_err();
    assert!(matches!(err, FimError::MissingIdentity));
    assert!(db.identity().load().await.unwrap().is_none());
}
