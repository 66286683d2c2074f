// Agentdesk core
//
// This crate holds the two pieces of logic behind the agent dashboard:
// - CollectionSync: live, ordered view of the "agents" collection plus mutations
// - TurnAssembler: builds the message list for a chat turn and calls a completion endpoint
//
// Key design decisions:
// - External services sit behind traits (DocumentStore, CompletionTransport) and are
//   injected at construction time, so tests run against the in-memory fakes
// - Live queries are streams of complete snapshots; callback subscriptions wrap them
// - Raw documents are parsed with defaults and never fail on missing fields
// - Each component reports its own typed error (StoreError, CompletionError)

pub mod agent;
pub mod chat;
pub mod collection_sync;
pub mod config;
pub mod document;
pub mod error;
pub mod message;
pub mod protocol;
pub mod traits;
pub mod turn;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use agent::{AgentPayload, AgentRecord, AgentStatus, AGENTS_COLLECTION};
pub use chat::{ChatReply, ChatSession, ConversationTurn, Sender};
pub use collection_sync::{AgentSnapshots, CollectionSync, Subscription};
pub use config::{CompletionOptions, DeskConfig};
pub use document::{CollectionQuery, DocumentWrite, FieldValue, RawDocument, SortDirection};
pub use error::{CompletionError, DeskError, Result, StoreError};
pub use message::{ChatMessage, HistoryEntry, HistoryRole, MessageRole};
pub use protocol::{CompletionRequest, CompletionResponse, CompletionUsage};
pub use traits::{CompletionTransport, DocumentStore, SnapshotStream, TransportError};
pub use turn::{assemble_messages, classify_transport_error, validate_api_key, TurnAssembler};
