// Database-backed DocumentStore implementation
//
// All live queries of a store share one LISTEN connection. A background task
// forwards each notification (its payload names the changed collection) to a
// broadcast channel; every live query re-reads its collection on a match, so
// every item on a stream is a complete, ordered snapshot.

use agentdesk_core::{
    traits::{DocumentStore, SnapshotStream},
    CollectionQuery, DocumentWrite, RawDocument, StoreError,
};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, trace};

use crate::repositories::Database;

/// Notification channel carrying the name of the changed collection
pub const CHANGE_CHANNEL: &str = "agentdesk_documents";

// SQLSTATE for insufficient_privilege
const INSUFFICIENT_PRIVILEGE: &str = "42501";

const CHANGE_FEED_CAPACITY: usize = 256;

// ============================================================================
// ChangeFeed - One LISTEN connection fanned out to every live query
// ============================================================================

#[derive(Debug, Clone)]
enum ChangeSignal {
    Changed(String),
    Failed(StoreError),
}

struct ChangeFeed {
    changes: broadcast::Sender<ChangeSignal>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeFeed {
    fn new() -> Self {
        Self {
            changes: broadcast::channel(CHANGE_FEED_CAPACITY).0,
            pump: Mutex::new(None),
        }
    }

    /// Subscribe to change signals, (re)starting the LISTEN task if needed
    ///
    /// The returned receiver only sees notifications for commits made after
    /// this call returns.
    async fn subscribe(
        &self,
        pool: &PgPool,
    ) -> Result<broadcast::Receiver<ChangeSignal>, StoreError> {
        let mut pump = self.pump.lock().await;

        let running = pump.as_ref().is_some_and(|task| !task.is_finished());
        if !running {
            let mut listener = PgListener::connect_with(pool)
                .await
                .map_err(map_sqlx_error)?;
            listener
                .listen(CHANGE_CHANNEL)
                .await
                .map_err(map_sqlx_error)?;
            debug!(channel = CHANGE_CHANNEL, "change feed listening");
            *pump = Some(tokio::spawn(forward_notifications(
                listener,
                self.changes.clone(),
            )));
        }

        Ok(self.changes.subscribe())
    }

    fn listener_count(&self) -> usize {
        self.changes.receiver_count()
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        if let Some(task) = self.pump.get_mut().take() {
            task.abort();
        }
    }
}

async fn forward_notifications(mut listener: PgListener, changes: broadcast::Sender<ChangeSignal>) {
    loop {
        let signal = match listener.try_recv().await {
            Ok(Some(notification)) => ChangeSignal::Changed(notification.payload().to_string()),
            // Changes committed while disconnected are lost.
            Ok(None) => ChangeSignal::Failed(StoreError::unavailable(
                "Live query connection was lost",
            )),
            Err(err) => ChangeSignal::Failed(map_sqlx_error(err)),
        };

        let failed = matches!(signal, ChangeSignal::Failed(_));
        // No receivers is fine: nobody is listening.
        let _ = changes.send(signal);
        if failed {
            return;
        }
    }
}

// ============================================================================
// PgDocumentStore - Document collections in Postgres
// ============================================================================

/// Postgres document store
///
/// Ids are generated by the store and server timestamps come from the
/// database clock, so every client agrees on ordering. Live queries hold
/// no pool connection between snapshots; they share a single listening
/// connection for change notifications.
#[derive(Clone)]
pub struct PgDocumentStore {
    db: Database,
    feed: Arc<ChangeFeed>,
}

impl PgDocumentStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            feed: Arc::new(ChangeFeed::new()),
        }
    }

    /// Connect and apply migrations
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = Database::from_url(database_url).await?;
        db.migrate().await?;
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Number of open live queries
    pub fn listener_count(&self) -> usize {
        self.feed.listener_count()
    }

    async fn snapshot(&self, query: &CollectionQuery) -> Result<Vec<RawDocument>, StoreError> {
        let rows = self.db.list_documents(query).await.map_err(map_error)?;
        Ok(rows.into_iter().map(RawDocument::from).collect())
    }
}

enum ListenState {
    Initial(Vec<RawDocument>, BroadcastStream<ChangeSignal>),
    Live(BroadcastStream<ChangeSignal>),
    Closed,
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn listen(&self, query: CollectionQuery) -> Result<SnapshotStream, StoreError> {
        // Subscribe before reading so no commit slips between snapshot and feed.
        let changes = BroadcastStream::new(self.feed.subscribe(self.db.pool()).await?);
        let initial = self.snapshot(&query).await?;
        debug!(
            collection = %query.collection,
            documents = initial.len(),
            "live query opened"
        );

        let store = self.clone();
        let snapshots = stream::unfold(
            ListenState::Initial(initial, changes),
            move |state| {
                let store = store.clone();
                let query = query.clone();
                async move {
                    let mut changes = match state {
                        ListenState::Initial(docs, changes) => {
                            return Some((Ok(docs), ListenState::Live(changes)));
                        }
                        ListenState::Live(changes) => changes,
                        ListenState::Closed => return None,
                    };

                    loop {
                        match changes.next().await {
                            Some(Ok(ChangeSignal::Changed(collection)))
                                if collection == query.collection =>
                            {
                                trace!(collection = %query.collection, "collection changed");
                            }
                            Some(Ok(ChangeSignal::Changed(_))) => continue,
                            Some(Ok(ChangeSignal::Failed(err))) => {
                                return Some((Err(err), ListenState::Closed));
                            }
                            // Snapshots are complete, so a lagging query just re-reads.
                            Some(Err(BroadcastStreamRecvError::Lagged(_))) => {}
                            None => return None,
                        }

                        return match store.snapshot(&query).await {
                            Ok(docs) => Some((Ok(docs), ListenState::Live(changes))),
                            Err(err) => Some((Err(err), ListenState::Closed)),
                        };
                    }
                }
            },
        );

        Ok(Box::pin(snapshots))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError> {
        let row = self
            .db
            .get_document(collection, id)
            .await
            .map_err(map_error)?;
        Ok(row.map(RawDocument::from))
    }

    async fn insert(&self, collection: &str, write: DocumentWrite) -> Result<String, StoreError> {
        self.db
            .insert_document(collection, &write)
            .await
            .map_err(map_error)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), StoreError> {
        let updated = self
            .db
            .update_document(collection, id, &write)
            .await
            .map_err(map_error)?;

        if updated {
            Ok(())
        } else {
            Err(StoreError::not_found(collection, id))
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.db
            .delete_document(collection, id)
            .await
            .map_err(map_error)?;
        Ok(())
    }
}

impl std::fmt::Debug for PgDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDocumentStore")
            .field("pool_size", &self.db.pool().size())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

fn map_error(err: anyhow::Error) -> StoreError {
    match err.downcast::<sqlx::Error>() {
        Ok(err) => map_sqlx_error(err),
        Err(err) => StoreError::internal(err.to_string()),
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::unavailable(err.to_string()),
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(INSUFFICIENT_PRIVILEGE) => {
            StoreError::permission_denied(db_err.message())
        }
        _ => StoreError::internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn test_io_errors_are_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            map_sqlx_error(sqlx::Error::Io(io)),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn test_other_errors_are_internal() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Internal(_)
        ));
    }

    #[test]
    fn test_wrapped_errors_are_unwrapped() {
        let err = anyhow::Error::new(sqlx::Error::PoolTimedOut);
        assert!(matches!(map_error(err), StoreError::Unavailable(_)));

        let err = anyhow::anyhow!("migration checksum mismatch");
        assert!(matches!(map_error(err), StoreError::Internal(_)));
    }
}
