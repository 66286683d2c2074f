// Core traits for pluggable backends
//
// These traits keep collection sync and turn assembly independent of the
// services behind them:
// - In-memory implementations for examples and testing (memory.rs)
// - Postgres document store (agentdesk-storage)
// - HTTPS completion transport (agentdesk-openai)

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use crate::document::{CollectionQuery, DocumentWrite, RawDocument};
use crate::error::StoreError;
use crate::protocol::{CompletionRequest, CompletionResponse};

// ============================================================================
// DocumentStore - Hosted document collections with live queries
// ============================================================================

/// Stream of full, ordered result sets for a live query
///
/// A new item is produced for the initial load and after every change to the
/// collection. The stream ends after yielding an error.
pub type SnapshotStream =
    Pin<Box<dyn Stream<Item = std::result::Result<Vec<RawDocument>, StoreError>> + Send>>;

/// Trait for document stores
///
/// Ids and timestamps are assigned by the store, never by the caller.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a live query over a collection
    async fn listen(&self, query: CollectionQuery) -> Result<SnapshotStream, StoreError>;

    /// Fetch a single document
    async fn get(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError>;

    /// Insert a document and return its store-assigned id
    async fn insert(&self, collection: &str, write: DocumentWrite) -> Result<String, StoreError>;

    /// Merge fields into an existing document
    ///
    /// Fails with `StoreError::NotFound` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, write: DocumentWrite)
        -> Result<(), StoreError>;

    /// Delete a document; deleting a missing document is not an error
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

// ============================================================================
// CompletionTransport - Chat completion HTTP round trip
// ============================================================================

/// Failure of a completion round trip, before classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The provider answered with a non-success status
    #[error("Provider returned status {status}")]
    Status {
        status: u16,
        message: Option<String>,
    },

    /// The request never got a response
    #[error("Network error: {0}")]
    Network(String),

    /// The response body could not be decoded
    #[error("Malformed provider response: {0}")]
    Decode(String),
}

/// Trait for chat completion transports
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Send one request authenticated with the given API key
    async fn send(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, TransportError>;
}
