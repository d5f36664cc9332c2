//! TTL Expiration Tests
//!
//! Tests for:
//! - Expiring index derived from the schema ttl
//! - Purging expired documents from the memory engine
//! - The background worker sweep
//! - Ttl values beyond the representable time range

mod common;

use chrono::{Duration, Utc};
use common::doc;
use docshape::storage::{Document, MemoryEngine};
use docshape::{Adapter, AdapterConfig, SetOptions, TtlWorker};
use serde_json::json;
use std::sync::Arc;

async fn sessions() -> (Adapter, Arc<MemoryEngine>) {
    let engine = Arc::new(MemoryEngine::new());
    let mut adapter = Adapter::with_engine(AdapterConfig::memory(), engine.clone());
    adapter.define(
        "sessions",
        json!({
            "key": "token",
            "ttl": 2,
            "properties": {"token": {"type": "string"}, "user": {"type": "string"}},
            "options": {"timestamps": true}
        }),
    );
    adapter.sync().await.unwrap();
    (adapter, engine)
}

#[tokio::test]
async fn test_expiry_uses_updated_at_field() {
    let (adapter, engine) = sessions().await;
    let table = adapter.table("sessions").unwrap();
    let stored = table
        .set(doc(json!({"token": "t1", "user": "alice"})), SetOptions::default())
        .await
        .unwrap();
    assert!(stored.contains_key("createdAt"));
    assert!(stored.contains_key("updatedAt"));

    assert_eq!(engine.purge_expired(Utc::now()), 0);
    assert_eq!(engine.purge_expired(Utc::now() + Duration::seconds(3)), 1);
    assert_eq!(table.count(Document::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_collections_without_ttl_are_kept() {
    let (mut adapter, engine) = sessions().await;
    adapter.define("notes", json!({"properties": {"text": {"type": "string"}}}));
    adapter.sync().await.unwrap();

    let notes = adapter.table("notes").unwrap();
    notes
        .set(doc(json!({"text": "keep me"})), SetOptions::default())
        .await
        .unwrap();
    adapter
        .table("sessions")
        .unwrap()
        .set(doc(json!({"token": "t1"})), SetOptions::default())
        .await
        .unwrap();

    assert_eq!(engine.purge_expired(Utc::now() + Duration::days(365)), 1);
    assert_eq!(notes.count(Document::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_worker_sweep_removes_expired() {
    let (adapter, engine) = sessions().await;
    let table = adapter.table("sessions").unwrap();
    table
        .set(doc(json!({"token": "t1"})), SetOptions::default())
        .await
        .unwrap();

    let worker = TtlWorker::new(engine.clone()).with_interval(1);
    assert_eq!(worker.sweep().await, 0);

    tokio::time::sleep(std::time::Duration::from_millis(3100)).await;
    assert_eq!(worker.sweep().await, 1);
    assert_eq!(table.count(Document::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_out_of_range_ttl_never_expires() {
    for ttl in [json!(10_000_000_000_000u64), json!(u64::MAX)] {
        let engine = Arc::new(MemoryEngine::new());
        let mut adapter = Adapter::with_engine(AdapterConfig::memory(), engine.clone());
        adapter.define(
            "archive",
            json!({
                "key": "token",
                "ttl": ttl,
                "properties": {"token": {"type": "string"}}
            }),
        );
        adapter.sync().await.unwrap();

        let table = adapter.table("archive").unwrap();
        table
            .set(doc(json!({"token": "t1"})), SetOptions::default())
            .await
            .unwrap();
        assert_eq!(table.count(Document::new()).await.unwrap(), 1);
        assert_eq!(engine.purge_expired(Utc::now() + Duration::days(365 * 1000)), 0);
    }
}
