// Error types for collection sync and turn assembly
//
// Each component surfaces its own typed failure:
// - StoreError for document store reads and writes (CollectionSync)
// - CompletionError for chat completion calls (TurnAssembler)
// DeskError aggregates both for callers that drive whole flows (ChatSession, config).

use thiserror::Error;

/// Result type alias for flows that span both components
pub type Result<T> = std::result::Result<T, DeskError>;

/// Errors raised by a document store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed document does not exist
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// The store refused the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other store failure
    #[error("Store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create a not-found error
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Create a permission error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        StoreError::PermissionDenied(msg.into())
    }

    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        StoreError::Unavailable(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        StoreError::Internal(msg.into())
    }
}

/// Errors raised while obtaining a chat completion
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompletionError {
    /// Missing, malformed or rejected API key
    #[error("Invalid or missing API key")]
    InvalidCredentials,

    /// Provider rate limit hit (HTTP 429)
    #[error("Rate limit exceeded, wait a moment and try again")]
    RateLimited,

    /// Provider-side fault (HTTP 5xx)
    #[error("Completion provider is unavailable, try again later")]
    ProviderUnavailable,

    /// No choices, or an empty first choice
    #[error("Completion provider returned an empty response")]
    EmptyResponse,

    /// Anything else, with the provider's message when it sent one
    #[error("{}", message.as_deref().unwrap_or("Error communicating with the completion provider"))]
    UnknownProvider { message: Option<String> },
}

impl CompletionError {
    /// Create an unknown provider error carrying a message
    pub fn unknown(msg: impl Into<String>) -> Self {
        CompletionError::UnknownProvider {
            message: Some(msg.into()),
        }
    }
}

/// Aggregate error for multi-step flows
#[derive(Debug, Error)]
pub enum DeskError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Agent lookup came back empty
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DeskError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        DeskError::Configuration(msg.into())
    }

    /// Create an agent not found error
    pub fn agent_not_found(agent_id: impl Into<String>) -> Self {
        DeskError::AgentNotFound(agent_id.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_display_uses_provider_message() {
        let err = CompletionError::unknown("model not found");
        assert_eq!(err.to_string(), "model not found");
    }

    #[test]
    fn test_unknown_provider_display_falls_back() {
        let err = CompletionError::UnknownProvider { message: None };
        assert_eq!(
            err.to_string(),
            "Error communicating with the completion provider"
        );
    }

    #[test]
    fn test_desk_error_wraps_component_errors() {
        let err: DeskError = StoreError::not_found("agents", "a1").into();
        assert!(matches!(err, DeskError::Store(StoreError::NotFound { .. })));
        assert_eq!(err.to_string(), "Document not found: agents/a1");

        let err: DeskError = CompletionError::RateLimited.into();
        assert!(matches!(
            err,
            DeskError::Completion(CompletionError::RateLimited)
        ));
    }
}
