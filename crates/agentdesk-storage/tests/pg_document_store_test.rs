// Integration tests for the Postgres document store
//
// Run with: DATABASE_URL=postgres://... cargo test -p agentdesk-storage -- --ignored
//
// Each test works in its own collection so tests can share a database.

use agentdesk_core::{AgentPayload, AgentStatus, CollectionSync, StoreError};
use agentdesk_storage::{PgDocumentStore, MAX_CONNECTIONS};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

async fn setup() -> (PgDocumentStore, CollectionSync) {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let store = PgDocumentStore::connect(&url).await.unwrap();
    let collection = format!("agents_test_{}", Uuid::now_v7().simple());
    let sync = CollectionSync::new(Arc::new(store.clone())).with_collection(collection);
    (store, sync)
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_create_get_update_delete() {
    let (_store, sync) = setup().await;

    let id = sync
        .create(&AgentPayload::new("Ava", "Friendly helper"))
        .await
        .unwrap();

    let created = sync.get(&id).await.unwrap().unwrap();
    assert_eq!(created.name, "Ava");
    assert_eq!(created.conversation_count, 0);
    assert_eq!(created.status, AgentStatus::Inactive);
    assert!(created.created_at.is_some());
    assert_eq!(created.updated_at, created.created_at);

    sync.update(
        &id,
        &AgentPayload::new("Ava 2", "Friendlier helper").with_status(AgentStatus::Active),
    )
    .await
    .unwrap();

    let updated = sync.get(&id).await.unwrap().unwrap();
    assert_eq!(updated.name, "Ava 2");
    assert_eq!(updated.status, AgentStatus::Active);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);

    sync.delete(&id).await.unwrap();
    assert!(sync.get(&id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_update_missing_document_is_not_found() {
    let (_store, sync) = setup().await;

    let err = sync
        .update("missing", &AgentPayload::new("Ghost", "Nobody"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_delete_missing_document_is_ok() {
    let (_store, sync) = setup().await;
    sync.delete("missing").await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_live_query_follows_changes_newest_first() {
    let (_store, sync) = setup().await;
    let mut snapshots = sync.snapshots().await.unwrap();

    let initial = snapshots.next().await.unwrap().unwrap();
    assert!(initial.is_empty());

    sync.create(&AgentPayload::new("First", "one")).await.unwrap();
    let after_first = timeout(Duration::from_secs(5), snapshots.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(after_first.len(), 1);

    sync.create(&AgentPayload::new("Second", "two")).await.unwrap();
    let after_second = timeout(Duration::from_secs(5), snapshots.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let names: Vec<_> = after_second.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Second", "First"]);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_subscription_delivers_snapshots() {
    let (_store, sync) = setup().await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let subscription = sync.subscribe(
        move |records| {
            let _ = tx.send(records.len());
        },
        |_err| {},
    );

    assert_eq!(
        timeout(Duration::from_secs(5), rx.recv()).await.unwrap(),
        Some(0)
    );

    sync.create(&AgentPayload::new("Ava", "helper")).await.unwrap();
    assert_eq!(
        timeout(Duration::from_secs(5), rx.recv()).await.unwrap(),
        Some(1)
    );

    subscription.unsubscribe();
    assert!(!subscription.is_active());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_live_queries_beyond_pool_size() {
    let (store, sync) = setup().await;

    let mut feeds = Vec::new();
    for _ in 0..(MAX_CONNECTIONS * 2) {
        let mut snapshots = timeout(Duration::from_secs(5), sync.snapshots())
            .await
            .expect("live query should open without waiting for a pool connection")
            .unwrap();
        assert!(snapshots.next().await.unwrap().unwrap().is_empty());
        feeds.push(snapshots);
    }
    assert_eq!(store.listener_count(), feeds.len());

    sync.create(&AgentPayload::new("Ava", "helper")).await.unwrap();

    for snapshots in feeds.iter_mut() {
        let records = timeout(Duration::from_secs(5), snapshots.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    drop(feeds);
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_non_timestamp_created_at_sorts_last() {
    let (store, sync) = setup().await;

    sqlx::query("INSERT INTO documents (collection, id, fields) VALUES ($1, $2, $3)")
        .bind(sync.collection())
        .bind("legacy")
        .bind(serde_json::json!({ "name": "legacy", "createdAt": 1714564800 }))
        .execute(store.database().pool())
        .await
        .unwrap();
    let fresh = sync
        .create(&AgentPayload::new("Fresh", "new"))
        .await
        .unwrap();

    let mut snapshots = sync.snapshots().await.unwrap();
    let records = snapshots.next().await.unwrap().unwrap();

    assert_eq!(records[0].id, fresh);
    assert!(records[0].created_at.is_some());
    assert_eq!(records[1].id, "legacy");
    assert!(records[1].created_at.is_none());
}
