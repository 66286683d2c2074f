// In-memory implementations for examples and testing
//
// These implementations keep all data in memory, making them perfect for:
// - Standalone examples that don't need a database or an API key
// - Unit and integration tests (fault injection, injectable clock, call logs)
// - Quick prototyping

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use crate::document::{compare_field_values, resolve_write, CollectionQuery, DocumentWrite};
use crate::document::{RawDocument, SortDirection};
use crate::error::StoreError;
use crate::protocol::{CompletionRequest, CompletionResponse};
use crate::traits::{CompletionTransport, DocumentStore, SnapshotStream, TransportError};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// ============================================================================
// InMemoryDocumentStore - Document collections with live queries
// ============================================================================

#[derive(Debug, Clone)]
enum StoreSignal {
    Changed(String),
    Failed(StoreError),
}

#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    fields: Map<String, Value>,
}

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<String, HashMap<String, StoredDocument>>,
    next_seq: u64,
    pending_failure: Option<StoreError>,
}

impl StoreState {
    fn take_failure(&mut self) -> Result<(), StoreError> {
        match self.pending_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// In-memory document store
///
/// Every committed write is fanned out to live queries over a broadcast
/// channel; each live query answers with a fresh, fully ordered snapshot.
/// Server timestamps come from the store clock (`Utc::now` unless replaced).
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<StoreState>>,
    changes: broadcast::Sender<StoreSignal>,
    clock: Clock,
}

impl InMemoryDocumentStore {
    /// Create a new, empty store
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            changes: broadcast::channel(CHANGE_CHANNEL_CAPACITY).0,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the server clock
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Pre-populate a document verbatim (useful for testing defensive parsing)
    pub async fn seed(&self, collection: &str, id: &str, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        {
            let mut state = self.state.write().await;
            let seq = state.next_seq();
            state
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), StoredDocument { seq, fields });
        }
        self.notify(collection);
    }

    /// Make the next store call (listen, get, insert, update or delete) fail
    pub async fn fail_next_call(&self, error: StoreError) {
        self.state.write().await.pending_failure = Some(error);
    }

    /// Push a failure to every open live query
    pub fn fail_listeners(&self, error: StoreError) {
        let _ = self.changes.send(StoreSignal::Failed(error));
    }

    /// Number of open live queries
    pub fn listener_count(&self) -> usize {
        self.changes.receiver_count()
    }

    /// Number of documents in a collection
    pub async fn len(&self, collection: &str) -> usize {
        self.state
            .read()
            .await
            .collections
            .get(collection)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Check whether a collection is empty
    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }

    fn notify(&self, collection: &str) {
        // No receivers is fine: nobody is listening.
        let _ = self.changes.send(StoreSignal::Changed(collection.to_string()));
    }

    async fn snapshot(&self, query: &CollectionQuery) -> Vec<RawDocument> {
        let state = self.state.read().await;
        let Some(docs) = state.collections.get(&query.collection) else {
            return Vec::new();
        };

        let mut ordered: Vec<(&String, &StoredDocument)> = docs.iter().collect();
        ordered.sort_by(|(_, a), (_, b)| {
            let by_field =
                compare_field_values(a.fields.get(&query.order_by), b.fields.get(&query.order_by))
                    .then(a.seq.cmp(&b.seq));
            match query.direction {
                SortDirection::Ascending => by_field,
                SortDirection::Descending => by_field.reverse(),
            }
        });

        ordered
            .into_iter()
            .map(|(id, doc)| RawDocument::new(id.clone(), doc.fields.clone()))
            .collect()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

enum ListenState {
    Initial(Vec<RawDocument>, BroadcastStream<StoreSignal>),
    Live(BroadcastStream<StoreSignal>),
    Closed,
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn listen(&self, query: CollectionQuery) -> Result<SnapshotStream, StoreError> {
        self.state.write().await.take_failure()?;

        // Subscribe before reading so no change slips between snapshot and feed.
        let changes = BroadcastStream::new(self.changes.subscribe());
        let initial = self.snapshot(&query).await;
        let store = self.clone();

        let snapshots = stream::unfold(
            ListenState::Initial(initial, changes),
            move |state| {
                let store = store.clone();
                let query = query.clone();
                async move {
                    let mut changes = match state {
                        ListenState::Initial(initial, changes) => {
                            return Some((Ok(initial), ListenState::Live(changes)));
                        }
                        ListenState::Live(changes) => changes,
                        ListenState::Closed => return None,
                    };

                    loop {
                        match changes.next().await {
                            Some(Ok(StoreSignal::Changed(collection)))
                                if collection == query.collection =>
                            {
                                let snapshot = store.snapshot(&query).await;
                                return Some((Ok(snapshot), ListenState::Live(changes)));
                            }
                            Some(Ok(StoreSignal::Changed(_))) => continue,
                            Some(Ok(StoreSignal::Failed(err))) => {
                                return Some((Err(err), ListenState::Closed));
                            }
                            // Snapshots are complete, so a lagging listener just re-reads.
                            Some(Err(BroadcastStreamRecvError::Lagged(_))) => {
                                let snapshot = store.snapshot(&query).await;
                                return Some((Ok(snapshot), ListenState::Live(changes)));
                            }
                            None => return None,
                        }
                    }
                }
            },
        );

        Ok(Box::pin(snapshots))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError> {
        let mut state = self.state.write().await;
        state.take_failure()?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|doc| RawDocument::new(id, doc.fields.clone())))
    }

    async fn insert(&self, collection: &str, write: DocumentWrite) -> Result<String, StoreError> {
        let id = Uuid::now_v7().simple().to_string();
        {
            let mut state = self.state.write().await;
            state.take_failure()?;
            let fields = resolve_write(&write, (self.clock)());
            let seq = state.next_seq();
            state
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), StoredDocument { seq, fields });
        }
        self.notify(collection);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), StoreError> {
        {
            let mut state = self.state.write().await;
            state.take_failure()?;
            let now = (self.clock)();
            let doc = state
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            doc.fields.extend(resolve_write(&write, now));
        }
        self.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let removed = {
            let mut state = self.state.write().await;
            state.take_failure()?;
            state
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.remove(id))
                .is_some()
        };
        if removed {
            self.notify(collection);
        }
        Ok(())
    }
}

// ============================================================================
// MockCompletionTransport - Returns predefined responses
// ============================================================================

/// A request captured by the mock transport
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub api_key: String,
    pub request: CompletionRequest,
}

/// Mock completion transport for testing
///
/// Returns queued outcomes in order; once the queue is empty every call
/// gets a response with no choices.
#[derive(Debug, Default, Clone)]
pub struct MockCompletionTransport {
    outcomes: Arc<RwLock<VecDeque<Result<CompletionResponse, TransportError>>>>,
    call_log: Arc<RwLock<Vec<RecordedCall>>>,
}

impl MockCompletionTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full response
    pub async fn add_response(&self, response: CompletionResponse) {
        self.outcomes.write().await.push_back(Ok(response));
    }

    /// Queue a single-choice text response
    pub async fn add_text(&self, text: impl Into<String>) {
        self.add_response(CompletionResponse::text(text)).await;
    }

    /// Queue a transport failure
    pub async fn add_failure(&self, error: TransportError) {
        self.outcomes.write().await.push_back(Err(error));
    }

    /// Get the call log
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.call_log.read().await.clone()
    }

    /// Number of calls made so far
    pub async fn call_count(&self) -> usize {
        self.call_log.read().await.len()
    }

    /// Reset queue and call log
    pub async fn reset(&self) {
        self.outcomes.write().await.clear();
        self.call_log.write().await.clear();
    }
}

#[async_trait]
impl CompletionTransport for MockCompletionTransport {
    async fn send(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, TransportError> {
        self.call_log.write().await.push(RecordedCall {
            api_key: api_key.to_string(),
            request: request.clone(),
        });

        self.outcomes
            .write()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(CompletionResponse::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldValue;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn write(pairs: &[(&str, FieldValue)]) -> DocumentWrite {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn ticking_clock() -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
        let tick = Arc::new(AtomicI64::new(0));
        move || {
            let n = tick.fetch_add(1, Ordering::SeqCst);
            Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap()
        }
    }

    #[tokio::test]
    async fn test_insert_resolves_server_timestamp() {
        let store = InMemoryDocumentStore::new()
            .with_clock(|| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let id = store
            .insert(
                "agents",
                write(&[("name", "Bot".into()), ("createdAt", FieldValue::ServerTimestamp)]),
            )
            .await
            .unwrap();

        let doc = store.get("agents", &id).await.unwrap().unwrap();
        assert_eq!(doc.fields["name"], json!("Bot"));
        assert_eq!(doc.fields["createdAt"], json!("2024-01-01T00:00:00.000000Z"));
    }

    #[tokio::test]
    async fn test_update_merges_and_rejects_missing() {
        let store = InMemoryDocumentStore::new();
        let id = store
            .insert("agents", write(&[("name", "A".into()), ("count", 3u64.into())]))
            .await
            .unwrap();

        store
            .update("agents", &id, write(&[("name", "B".into())]))
            .await
            .unwrap();
        let doc = store.get("agents", &id).await.unwrap().unwrap();
        assert_eq!(doc.fields["name"], json!("B"));
        assert_eq!(doc.fields["count"], json!(3));

        let err = store
            .update("agents", "missing", write(&[("name", "C".into())]))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::not_found("agents", "missing"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = InMemoryDocumentStore::new();
        store.delete("agents", "nope").await.unwrap();
        assert!(store.is_empty("agents").await);
    }

    #[tokio::test]
    async fn test_fail_next_call_is_consumed() {
        let store = InMemoryDocumentStore::new();
        store
            .fail_next_call(StoreError::permission_denied("read-only"))
            .await;

        let err = store.insert("agents", DocumentWrite::new()).await.unwrap_err();
        assert_eq!(err, StoreError::permission_denied("read-only"));
        assert!(store.insert("agents", DocumentWrite::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_listen_orders_and_follows_changes() {
        let store = InMemoryDocumentStore::new().with_clock(ticking_clock());
        let first = store
            .insert("agents", write(&[("createdAt", FieldValue::ServerTimestamp)]))
            .await
            .unwrap();

        let query = CollectionQuery::new("agents", "createdAt").descending();
        let mut snapshots = store.listen(query).await.unwrap();

        let initial = snapshots.next().await.unwrap().unwrap();
        assert_eq!(initial.len(), 1);

        let second = store
            .insert("agents", write(&[("createdAt", FieldValue::ServerTimestamp)]))
            .await
            .unwrap();
        let next = snapshots.next().await.unwrap().unwrap();
        let ids: Vec<_> = next.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn test_listen_ignores_other_collections() {
        let store = InMemoryDocumentStore::new();
        let mut snapshots = store
            .listen(CollectionQuery::new("agents", "createdAt"))
            .await
            .unwrap();
        assert!(snapshots.next().await.unwrap().unwrap().is_empty());

        store.insert("contacts", DocumentWrite::new()).await.unwrap();
        store.insert("agents", DocumentWrite::new()).await.unwrap();

        let next = snapshots.next().await.unwrap().unwrap();
        assert_eq!(next.len(), 1);
    }

    #[tokio::test]
    async fn test_listen_ends_after_failure() {
        let store = InMemoryDocumentStore::new();
        let mut snapshots = store
            .listen(CollectionQuery::new("agents", "createdAt"))
            .await
            .unwrap();
        snapshots.next().await.unwrap().unwrap();

        store.fail_listeners(StoreError::unavailable("connection reset"));

        let err = snapshots.next().await.unwrap().unwrap_err();
        assert_eq!(err, StoreError::unavailable("connection reset"));
        assert!(snapshots.next().await.is_none());
    }

    #[tokio::test]
    async fn test_equal_sort_keys_keep_insertion_order() {
        let store = InMemoryDocumentStore::new()
            .with_clock(|| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                store
                    .insert("agents", write(&[("createdAt", FieldValue::ServerTimestamp)]))
                    .await
                    .unwrap(),
            );
        }

        let query = CollectionQuery::new("agents", "createdAt").descending();
        let a: Vec<_> = store.snapshot(&query).await.into_iter().map(|d| d.id).collect();
        let b: Vec<_> = store.snapshot(&query).await.into_iter().map(|d| d.id).collect();

        ids.reverse();
        assert_eq!(a, ids);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_mock_transport_queue_and_log() {
        let transport = MockCompletionTransport::new();
        transport.add_text("first").await;
        transport
            .add_failure(TransportError::Network("offline".to_string()))
            .await;

        let request = CompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: Vec::new(),
            temperature: 0.5,
            max_tokens: 10,
        };

        let first = transport.send("sk-a", &request).await.unwrap();
        assert_eq!(first.first_content(), Some("first"));
        assert!(transport.send("sk-a", &request).await.is_err());
        let exhausted = transport.send("sk-b", &request).await.unwrap();
        assert!(exhausted.choices.is_empty());

        let calls = transport.calls().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].api_key, "sk-b");
    }
}
