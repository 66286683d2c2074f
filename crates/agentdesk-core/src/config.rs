// Configuration
//
// CompletionOptions carries per-call model settings with the provider defaults.
// DeskConfig gathers everything a binary needs from the environment.

use serde::{Deserialize, Serialize};

use crate::error::{DeskError, Result};

/// Lowest-cost chat model offered by the provider
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Model settings for a completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Model identifier (e.g., "gpt-3.5-turbo")
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl CompletionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Process-level configuration
#[derive(Clone, Default)]
pub struct DeskConfig {
    /// Completion provider API key (OPENAI_API_KEY)
    pub api_key: Option<String>,
    /// Override for the completion endpoint (OPENAI_BASE_URL)
    pub api_url: Option<String>,
    /// Postgres connection string (DATABASE_URL)
    pub database_url: Option<String>,
    /// Completion defaults (AGENTDESK_MODEL, AGENTDESK_TEMPERATURE, AGENTDESK_MAX_TOKENS)
    pub completion: CompletionOptions,
}

impl DeskConfig {
    /// Load configuration from environment variables
    ///
    /// Binaries should call `dotenvy::dotenv()` first so a `.env` file is honored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut completion = CompletionOptions::default();
        if let Some(model) = non_empty("AGENTDESK_MODEL") {
            completion.model = model;
        }
        if let Some(raw) = non_empty("AGENTDESK_TEMPERATURE") {
            completion.temperature = raw.trim().parse().map_err(|_| {
                DeskError::config(format!("AGENTDESK_TEMPERATURE is not a number: {raw}"))
            })?;
        }
        if let Some(raw) = non_empty("AGENTDESK_MAX_TOKENS") {
            completion.max_tokens = raw.trim().parse().map_err(|_| {
                DeskError::config(format!(
                    "AGENTDESK_MAX_TOKENS is not a positive integer: {raw}"
                ))
            })?;
        }

        Ok(Self {
            api_key: non_empty("OPENAI_API_KEY"),
            api_url: non_empty("OPENAI_BASE_URL"),
            database_url: non_empty("DATABASE_URL"),
            completion,
        })
    }

    /// Database URL, or a configuration error when unset
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| DeskError::config("DATABASE_URL environment variable not set"))
    }
}

impl std::fmt::Debug for DeskConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeskConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("completion", &self.completion)
            .finish()
    }
}
