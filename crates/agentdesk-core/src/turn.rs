// Chat turn assembly
//
// The completion endpoint is stateless, so every call carries the whole
// conversation: one system message, the prior turns oldest first, then the
// new user message. TurnAssembler builds that list, makes the call and maps
// the outcome to a response text or a typed CompletionError.

use std::sync::Arc;
use tracing::debug;

use crate::config::CompletionOptions;
use crate::error::CompletionError;
use crate::message::{ChatMessage, HistoryEntry};
use crate::protocol::CompletionRequest;
use crate::traits::{CompletionTransport, TransportError};

/// Prefix every provider API key carries
pub const API_KEY_PREFIX: &str = "sk-";

/// Build the outbound message list
///
/// Order is fixed: system, history in original order, new user message.
/// Nothing is merged, dropped or deduplicated.
pub fn assemble_messages(
    system_prompt: &str,
    history: &[HistoryEntry],
    new_user_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(new_user_message));
    messages
}

/// Check that an API key is present and well formed
pub fn validate_api_key(api_key: Option<&str>) -> Result<&str, CompletionError> {
    match api_key {
        Some(key) if key.starts_with(API_KEY_PREFIX) && key.len() > API_KEY_PREFIX.len() => {
            Ok(key)
        }
        _ => Err(CompletionError::InvalidCredentials),
    }
}

/// Map a transport failure onto the completion error taxonomy
pub fn classify_transport_error(error: TransportError) -> CompletionError {
    match error {
        TransportError::Status { status: 401, .. } => CompletionError::InvalidCredentials,
        TransportError::Status { status: 429, .. } => CompletionError::RateLimited,
        TransportError::Status {
            status: 500..=599, ..
        } => CompletionError::ProviderUnavailable,
        TransportError::Status { message, .. } => CompletionError::UnknownProvider { message },
        TransportError::Network(message) | TransportError::Decode(message) => {
            CompletionError::UnknownProvider {
                message: Some(message),
            }
        }
    }
}

/// Assembles conversations and sends them to a completion transport
#[derive(Clone)]
pub struct TurnAssembler {
    transport: Arc<dyn CompletionTransport>,
}

impl TurnAssembler {
    pub fn new(transport: Arc<dyn CompletionTransport>) -> Self {
        Self { transport }
    }

    /// Send one user message in the context of a conversation
    ///
    /// Credentials are checked before anything goes on the wire. The history
    /// is not modified; appending the new turn and the reply is the caller's job.
    /// No retry is attempted for any failure.
    #[tracing::instrument(
        skip(self, system_prompt, history, new_user_message, api_key, options),
        fields(model = %options.model, history_len = history.len())
    )]
    pub async fn assemble_and_send(
        &self,
        system_prompt: &str,
        history: &[HistoryEntry],
        new_user_message: &str,
        api_key: Option<&str>,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        let api_key = validate_api_key(api_key)?;

        let request = CompletionRequest {
            model: options.model.clone(),
            messages: assemble_messages(system_prompt, history, new_user_message),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        debug!(messages = request.messages.len(), "sending completion request");

        let response = self
            .transport
            .send(api_key, &request)
            .await
            .map_err(classify_transport_error)?;

        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion received"
            );
        }

        match response.first_content() {
            Some(content) if !content.is_empty() => Ok(content.to_string()),
            _ => Err(CompletionError::EmptyResponse),
        }
    }
}

impl std::fmt::Debug for TurnAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnAssembler").finish_non_exhaustive()
    }
}
