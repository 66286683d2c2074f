// OpenAI completion transport
//
// Production CompletionTransport for OpenAI's chat completion API.
// Works with any OpenAI-compatible endpoint via with_base_url.

use agentdesk_core::protocol::ProviderErrorBody;
use agentdesk_core::{
    CompletionRequest, CompletionResponse, CompletionTransport, DeskConfig, DeskError,
    TransportError,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI completion transport
///
/// # Example
///
/// ```ignore
/// use agentdesk_openai::OpenAiTransport;
///
/// let transport = OpenAiTransport::new();
/// // or with custom endpoint
/// let transport = OpenAiTransport::with_base_url("https://api.example.com/v1/chat/completions");
/// // or with a request timeout
/// let transport = OpenAiTransport::with_timeout(std::time::Duration::from_secs(30))?;
/// ```
#[derive(Clone)]
pub struct OpenAiTransport {
    client: Client,
    api_url: String,
}

impl OpenAiTransport {
    /// Create a transport for the public OpenAI endpoint
    pub fn new() -> Self {
        Self::with_base_url(OPENAI_API_URL)
    }

    /// Create a transport with a custom API URL
    pub fn with_base_url(api_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_url)
    }

    /// Create a transport around a preconfigured HTTP client
    pub fn with_client(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    /// Create a transport whose requests time out after `timeout`
    ///
    /// A timed-out request is reported as a network failure.
    pub fn with_timeout(timeout: Duration) -> agentdesk_core::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeskError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, OPENAI_API_URL))
    }

    /// Create a transport honoring the endpoint override in the config
    pub fn from_config(config: &DeskConfig) -> Self {
        match &config.api_url {
            Some(url) => Self::with_base_url(url.clone()),
            None => Self::new(),
        }
    }

    /// Get the API URL
    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

impl Default for OpenAiTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn send(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, TransportError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), "completion response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: ProviderErrorBody::message_from(&body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl std::fmt::Debug for OpenAiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiTransport")
            .field("api_url", &self.api_url())
            .finish()
    }
}
