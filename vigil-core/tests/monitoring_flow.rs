mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use tempfile::tempdir;
use tokio::sync::mpsc;
use vigil_core::alerts::{
    AlertDispatcher, AlertTransport, DeliveryStatus, HttpAlertTransport, HttpInventoryTransport,
};
use vigil_core::config::PipelineConfig;
use vigil_core::database::{BaselineRepository, ChangeEventRepository};
use vigil_core::database::SqliteDatabase;
use vigil_core::engine::{Classification, DiffEngine};
use vigil_core::hasher::{HashOutcome, hash_file};
use vigil_core::pipeline::EventPipeline;
use vigil_core::scan::Reconciler;
use vigil_core::types::{AgentId, ChangeKind, RawEvent};

use support::{AGENT_ID, RecordingTransport, harness, harness_with, spawn_collector};

const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
const WORLD: &str = "486ea46224d1bb4fb680f34f7c9ad96a8f24ec88be73ea8e5a6c65260e9cb8a7";

#[tokio::test]
async fn file_lifecycle_is_recorded_and_alerted() -> Result<()> {
    let h = harness().await?;
    let dir = tempdir()?;
    let path = dir.path().join("a.txt");

    std::fs::write(&path, "hello")?;
    let added = h.engine.evaluate(&RawEvent::created(&path)).await?;
    assert_eq!(
        added,
        Classification::Added {
            digest: HELLO.into()
        }
    );

    std::fs::write(&path, "world")?;
    let modified = h.engine.evaluate(&RawEvent::modified(&path)).await?;
    assert_eq!(
        modified,
        Classification::Modified {
            old_digest: Some(HELLO.into()),
            new_digest: WORLD.into(),
        }
    );

    std::fs::remove_file(&path)?;
    let removed = h.engine.evaluate(&RawEvent::removed(&path)).await?;
    assert_eq!(
        removed,
        Classification::Removed {
            old_digest: Some(WORLD.into())
        }
    );
    assert!(h.db.baseline().lookup(&path).await?.is_none());

    std::fs::write(&path, "hello")?;
    let readded = h.engine.evaluate(&RawEvent::created(&path)).await?;
    assert!(matches!(readded, Classification::Added { .. }));

    let logged: Vec<ChangeKind> = h
        .db
        .change_events()
        .list_recent(10)
        .await?
        .into_iter()
        .rev()
        .map(|e| e.kind)
        .collect();
    let expected = vec![
        ChangeKind::Added,
        ChangeKind::Modified,
        ChangeKind::Removed,
        ChangeKind::Added,
    ];
    assert_eq!(logged, expected);
    assert_eq!(h.transport.kinds(), expected);

    let payloads = h.transport.payloads();
    assert!(payloads.iter().all(|p| p.agent_id == AGENT_ID));
    assert_eq!(payloads[1].old_hash.as_deref(), Some(HELLO));
    assert_eq!(payloads[1].new_hash.as_deref(), Some(WORLD));
    assert_eq!(payloads[2].old_hash.as_deref(), Some(WORLD));
    assert_eq!(payloads[2].new_hash, None);
    Ok(())
}

#[tokio::test]
async fn unchanged_content_writes_nothing() -> Result<()> {
    let h = harness().await?;
    let dir = tempdir()?;
    let path = dir.path().join("b.txt");
    std::fs::write(&path, "same")?;

    h.engine.evaluate(&RawEvent::created(&path)).await?;
    let before = h.db.baseline().lookup(&path).await?;

    for _ in 0..2 {
        // Touching the mtime alone is not a change.
        std::fs::write(&path, "same")?;
        let outcome = h.engine.evaluate(&RawEvent::reconcile(&path)).await?;
        assert_eq!(outcome, Classification::Unchanged);
    }

    assert_eq!(h.db.baseline().lookup(&path).await?, before);
    assert_eq!(h.db.change_events().list_recent(10).await?.len(), 1);
    assert_eq!(h.transport.kinds(), vec![ChangeKind::Added]);
    Ok(())
}

#[tokio::test]
async fn repeated_removal_is_a_no_op() -> Result<()> {
    let h = harness().await?;
    let dir = tempdir()?;
    let path = dir.path().join("c.txt");
    std::fs::write(&path, "x")?;
    h.engine.evaluate(&RawEvent::created(&path)).await?;
    std::fs::remove_file(&path)?;

    let first = h.engine.evaluate(&RawEvent::removed(&path)).await?;
    let second = h.engine.evaluate(&RawEvent::removed(&path)).await?;
    let swept = h.engine.evaluate(&RawEvent::reconcile(&path)).await?;

    assert!(matches!(first, Classification::Removed { .. }));
    assert_eq!(second, Classification::Untracked);
    assert_eq!(swept, Classification::Untracked);
    assert_eq!(h.transport.kinds(), vec![ChangeKind::Added, ChangeKind::Removed]);
    Ok(())
}

#[tokio::test]
async fn watcher_and_sweep_racing_on_one_path_agree() -> Result<()> {
    let h = harness().await?;
    let dir = tempdir()?;
    let path = dir.path().join("race.txt");
    std::fs::write(&path, "v1")?;
    h.engine.evaluate(&RawEvent::created(&path)).await?;
    std::fs::write(&path, "v2")?;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&h.engine);
        let event = if i % 2 == 0 {
            RawEvent::modified(&path)
        } else {
            RawEvent::reconcile(&path)
        };
        tasks.push(tokio::spawn(async move { engine.evaluate(&event).await }));
    }

    let mut modified = 0;
    for task in tasks {
        match task.await?? {
            Classification::Modified { .. } => modified += 1,
            Classification::Unchanged => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(modified, 1);
    let HashOutcome::Digest(on_disk) = hash_file(&path).await? else {
        panic!("file should exist");
    };
    let record = h.db.baseline().lookup(&path).await?.expect("tracked");
    assert_eq!(record.digest.as_deref(), Some(on_disk.as_str()));
    Ok(())
}

#[tokio::test]
async fn failed_delivery_still_commits_local_state() -> Result<()> {
    let h = harness_with(RecordingTransport::failing()).await?;
    let dir = tempdir()?;
    let path = dir.path().join("d.txt");
    std::fs::write(&path, "hello")?;

    let outcome = h.engine.evaluate(&RawEvent::created(&path)).await?;

    assert!(matches!(outcome, Classification::Added { .. }));
    assert!(h.db.baseline().lookup(&path).await?.is_some());
    assert_eq!(h.db.change_events().list_recent(5).await?.len(), 1);
    assert_eq!(h.transport.payloads().len(), 1);
    Ok(())
}

#[tokio::test]
async fn http_transport_posts_collector_payload() -> Result<()> {
    let collector = spawn_collector(StatusCode::OK).await?;
    let transport = HttpAlertTransport::new(collector.url.clone(), Duration::from_secs(5))?;
    let dispatcher = AlertDispatcher::new(AgentId::new(AGENT_ID)?, Arc::new(transport));

    let status = dispatcher
        .dispatch(
            std::path::Path::new("/srv/www/index.html"),
            ChangeKind::Added,
            None,
            Some(HELLO.into()),
        )
        .await;

    assert_eq!(status, DeliveryStatus::Delivered);
    let received = collector.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].agent_id, AGENT_ID);
    assert_eq!(received[0].file_path, "/srv/www/index.html");
    assert_eq!(received[0].change_type, ChangeKind::Added);
    assert_eq!(received[0].old_hash, None);
    assert_eq!(received[0].new_hash.as_deref(), Some(HELLO));
    Ok(())
}

#[tokio::test]
async fn inventory_reaches_the_collector_after_add_and_modify() -> Result<()> {
    let collector = spawn_collector(StatusCode::OK).await?;
    let alerts = HttpAlertTransport::new(collector.url.clone(), Duration::from_secs(5))?;
    let inventory =
        HttpInventoryTransport::new(collector.inventory_url.clone(), Duration::from_secs(5))?;
    let db = SqliteDatabase::in_memory().await?;
    let engine = DiffEngine::new(
        Arc::new(db.baseline().clone()),
        Arc::new(db.journal().clone()),
        AlertDispatcher::new(AgentId::new(AGENT_ID)?, Arc::new(alerts))
            .with_inventory(Arc::new(inventory)),
    );
    let dir = tempdir()?;
    let path = dir.path().join("index.html");

    std::fs::write(&path, "hello")?;
    engine.evaluate(&RawEvent::created(&path)).await?;
    std::fs::write(&path, "world")?;
    engine.evaluate(&RawEvent::modified(&path)).await?;
    std::fs::remove_file(&path)?;
    engine.evaluate(&RawEvent::removed(&path)).await?;

    let reported = collector.inventory.lock().unwrap().clone();
    assert_eq!(reported.len(), 2);
    assert_eq!(reported[0].hash, HELLO);
    assert_eq!(reported[1].hash, WORLD);
    assert_eq!(reported[1].agent_id, AGENT_ID);
    assert_eq!(reported[1].size, 5);
    assert_eq!(collector.received.lock().unwrap().len(), 3);
    Ok(())
}

#[tokio::test]
async fn unreachable_inventory_leaves_the_change_committed() -> Result<()> {
    let db = SqliteDatabase::in_memory().await?;
    let transport = Arc::new(RecordingTransport::default());
    let inventory = HttpInventoryTransport::new(
        "http://127.0.0.1:1/api/files".parse()?,
        Duration::from_secs(2),
    )?;
    let engine = DiffEngine::new(
        Arc::new(db.baseline().clone()),
        Arc::new(db.journal().clone()),
        AlertDispatcher::new(AgentId::new(AGENT_ID)?, transport.clone())
            .with_inventory(Arc::new(inventory)),
    );
    let dir = tempdir()?;
    let path = dir.path().join("f.txt");
    std::fs::write(&path, "hello")?;

    let outcome = engine.evaluate(&RawEvent::created(&path)).await?;

    assert!(matches!(outcome, Classification::Added { .. }));
    assert!(db.baseline().lookup(&path).await?.is_some());
    assert_eq!(transport.kinds(), vec![ChangeKind::Added]);
    Ok(())
}

#[tokio::test]
async fn collector_rejection_surfaces_its_error_field() -> Result<()> {
    let collector = spawn_collector(StatusCode::BAD_REQUEST).await?;
    let transport = HttpAlertTransport::new(collector.url.clone(), Duration::from_secs(5))?;

    let payload = vigil_core::types::AlertPayload {
        agent_id: AGENT_ID.into(),
        file_path: "/srv/a".into(),
        change_type: ChangeKind::Removed,
        old_hash: Some(HELLO.into()),
        new_hash: None,
    };
    let err = transport.deliver(&payload).await.unwrap_err();
    assert!(err.to_string().contains("rejected by test collector"), "{err}");
    Ok(())
}

#[tokio::test]
async fn unreachable_collector_does_not_block_the_engine() -> Result<()> {
    let db = SqliteDatabase::in_memory().await?;
    let transport = HttpAlertTransport::new(
        "http://127.0.0.1:1/api/alerts".parse()?,
        Duration::from_secs(2),
    )?;
    let engine = support::engine_for(&db, Arc::new(transport))?;
    let dir = tempdir()?;
    let path = dir.path().join("e.txt");
    std::fs::write(&path, "hello")?;

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        engine.evaluate(&RawEvent::created(&path)),
    )
    .await??;

    assert!(matches!(outcome, Classification::Added { .. }));
    assert!(db.baseline().lookup(&path).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn sweep_catches_changes_made_while_not_watching() -> Result<()> {
    let h = harness().await?;
    let dir = tempdir()?;
    let kept = dir.path().join("kept.txt");
    let edited = dir.path().join("edited.txt");
    let deleted = dir.path().join("deleted.txt");
    for path in [&kept, &edited, &deleted] {
        std::fs::write(path, "v1")?;
        h.engine.evaluate(&RawEvent::created(path)).await?;
    }

    std::fs::write(&edited, "v2")?;
    std::fs::remove_file(&deleted)?;
    let fresh = dir.path().join("fresh.txt");
    std::fs::write(&fresh, "new")?;

    let (tx, rx) = mpsc::channel(64);
    let pipeline = EventPipeline::spawn(Arc::clone(&h.engine), PipelineConfig::default(), rx);
    let reconciler = Reconciler::new(
        vec![dir.path().to_path_buf()],
        Duration::from_secs(600),
        Arc::new(h.db.baseline().clone()),
        tx,
    );
    reconciler.reconcile_now().await?;
    drop(reconciler);

    let stats = pipeline.join().await;
    assert_eq!(stats.added, 1);
    assert_eq!(stats.modified, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.unchanged, 1);
    assert_eq!(h.db.baseline().count().await?, 3);
    assert!(h.db.baseline().lookup(&deleted).await?.is_none());
    Ok(())
}
