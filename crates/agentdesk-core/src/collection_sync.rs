// Live agent collection
//
// CollectionSync keeps a consumer's view of the "agents" collection current:
// - snapshots(): stream of complete, createdAt-descending record lists
// - subscribe(): callback form of the same feed with a cancel handle
// - create/update/delete: mutations with store-assigned ids and timestamps
//
// Snapshots are never diffed. Every upstream change re-delivers the whole
// ordered set, parsed with defaults (see AgentRecord::from_document).

use futures::{future, Stream, StreamExt};
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::agent::{fields, AgentPayload, AgentRecord, AGENTS_COLLECTION};
use crate::document::CollectionQuery;
use crate::error::StoreError;
use crate::traits::DocumentStore;

/// Stream of ordered agent snapshots; ends after the first error
pub type AgentSnapshots =
    Pin<Box<dyn Stream<Item = std::result::Result<Vec<AgentRecord>, StoreError>> + Send>>;

/// Live view and mutations over the agent collection
#[derive(Clone)]
pub struct CollectionSync {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl CollectionSync {
    /// Create a sync over the default "agents" collection
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            collection: AGENTS_COLLECTION.to_string(),
        }
    }

    /// Point the sync at a different collection
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn query(&self) -> CollectionQuery {
        CollectionQuery::new(self.collection.clone(), fields::CREATED_AT).descending()
    }

    /// Open a live query and return it as a stream of parsed snapshots
    ///
    /// Dropping the stream detaches the query.
    pub async fn snapshots(&self) -> Result<AgentSnapshots, StoreError> {
        let raw = self.store.listen(self.query()).await?;
        debug!(collection = %self.collection, "opened live agent query");

        let parsed = raw
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                let item: Result<Vec<AgentRecord>, StoreError> = match item {
                    Ok(docs) => Ok(docs.iter().map(AgentRecord::from_document).collect()),
                    Err(err) => {
                        *failed = true;
                        Err(err)
                    }
                };
                future::ready(Some(item))
            })
            .inspect(|item| {
                if let Ok(records) = item {
                    trace!(count = records.len(), "agent snapshot");
                }
            });

        Ok(Box::pin(parsed))
    }

    /// Subscribe with callbacks
    ///
    /// `on_data` receives every snapshot; `on_error` fires at most once, after
    /// which the feed is closed and not retried. Callbacks for one
    /// subscription never run concurrently. Must be called from within a
    /// Tokio runtime.
    pub fn subscribe<D, E>(&self, on_data: D, on_error: E) -> Subscription
    where
        D: FnMut(Vec<AgentRecord>) + Send + 'static,
        E: FnOnce(StoreError) + Send + 'static,
    {
        let gate = Arc::new(DeliveryGate::new());
        let sync = self.clone();
        let task = tokio::spawn(deliver(sync, gate.clone(), on_data, on_error));

        Subscription {
            gate,
            task: Some(task),
        }
    }

    /// Fetch a single agent
    pub async fn get(&self, id: &str) -> Result<Option<AgentRecord>, StoreError> {
        let doc = self.store.get(&self.collection, id).await?;
        Ok(doc.as_ref().map(AgentRecord::from_document))
    }

    /// Create an agent and return its store-assigned id
    ///
    /// The conversation counter starts at zero; both timestamps come from the store clock.
    #[tracing::instrument(skip(self, payload), fields(collection = %self.collection))]
    pub async fn create(&self, payload: &AgentPayload) -> Result<String, StoreError> {
        let id = self
            .store
            .insert(&self.collection, payload.to_create_write())
            .await?;
        debug!(agent_id = %id, "agent created");
        Ok(id)
    }

    /// Overwrite the editable fields of an agent and refresh updatedAt
    ///
    /// No existence check is made up front; a missing id surfaces as the
    /// store's `NotFound`.
    #[tracing::instrument(skip(self, payload), fields(collection = %self.collection))]
    pub async fn update(&self, id: &str, payload: &AgentPayload) -> Result<(), StoreError> {
        self.store
            .update(&self.collection, id, payload.to_update_write())
            .await
    }

    /// Delete an agent
    #[tracing::instrument(skip(self), fields(collection = %self.collection))]
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(&self.collection, id).await
    }
}

impl std::fmt::Debug for CollectionSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionSync")
            .field("collection", &self.collection)
            .finish()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Serializes callback delivery against cancellation
///
/// Once `close` returns no callback is running and none will start, except
/// when `close` is called from inside a callback: it then returns at once
/// and only the calling callback is still on the stack.
struct DeliveryGate {
    state: Mutex<GateState>,
    idle: Condvar,
}

struct GateState {
    open: bool,
    running_on: Option<ThreadId>,
}

impl DeliveryGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                open: true,
                running_on: None,
            }),
            idle: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` if the gate is still open; returns whether it ran
    fn deliver(&self, f: impl FnOnce()) -> bool {
        {
            let mut state = self.lock();
            if !state.open {
                return false;
            }
            state.running_on = Some(thread::current().id());
        }

        // Cleared on unwind too, so a panicking callback never blocks `close`.
        let _running = RunningCallback(self);
        f();
        true
    }

    /// Close the gate; returns whether it was open
    fn close(&self) -> bool {
        let mut state = self.lock();
        let was_open = std::mem::replace(&mut state.open, false);
        if state.running_on == Some(thread::current().id()) {
            return was_open;
        }
        let _idle = self
            .idle
            .wait_while(state, |s| s.running_on.is_some())
            .unwrap_or_else(|e| e.into_inner());
        was_open
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }
}

struct RunningCallback<'a>(&'a DeliveryGate);

impl Drop for RunningCallback<'_> {
    fn drop(&mut self) {
        self.0.lock().running_on = None;
        self.0.idle.notify_all();
    }
}

/// Closes the gate when the delivery task ends, including by panic or abort
struct CloseOnExit(Arc<DeliveryGate>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

async fn deliver<D, E>(sync: CollectionSync, gate: Arc<DeliveryGate>, mut on_data: D, on_error: E)
where
    D: FnMut(Vec<AgentRecord>) + Send + 'static,
    E: FnOnce(StoreError) + Send + 'static,
{
    let _close = CloseOnExit(gate.clone());

    let mut snapshots = match sync.snapshots().await {
        Ok(snapshots) => snapshots,
        Err(err) => {
            gate.deliver(|| on_error(err));
            return;
        }
    };

    while let Some(item) = snapshots.next().await {
        match item {
            Ok(records) => {
                if !gate.deliver(|| on_data(records)) {
                    return;
                }
            }
            Err(err) => {
                gate.deliver(|| on_error(err));
                return;
            }
        }
    }
}

/// Handle to a callback subscription
///
/// Dropping the handle detaches the query as well.
pub struct Subscription {
    gate: Arc<DeliveryGate>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Permanently detach the live query
    ///
    /// Idempotent. Once this returns no further callback fires. When called
    /// from inside one of this subscription's callbacks it returns without
    /// waiting for that callback to finish.
    pub fn unsubscribe(&self) {
        if self.gate.close() {
            debug!("agent subscription detached");
        }
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Whether the feed is still live (not unsubscribed, not failed)
    pub fn is_active(&self) -> bool {
        self.gate.is_open()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
