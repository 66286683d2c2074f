// Agent domain types
//
// AgentRecord is the typed view of one document in the "agents" collection.
// Parsing is total: a missing or mistyped field falls back to its zero value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{parse_timestamp, DocumentWrite, FieldValue, RawDocument};

/// Collection holding agent documents
pub const AGENTS_COLLECTION: &str = "agents";

/// Document field names
pub mod fields {
    pub const NAME: &str = "name";
    pub const PERSONA: &str = "persona";
    pub const SYSTEM_PROMPT: &str = "systemPrompt";
    pub const STATUS: &str = "status";
    pub const CONVERSATION_COUNT: &str = "conversationCount";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
}

/// Agent status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Training,
    #[default]
    Inactive,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Training => "training",
            AgentStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AgentStatus {
    fn from(s: &str) -> Self {
        match s {
            "active" => AgentStatus::Active,
            "training" => AgentStatus::Training,
            _ => AgentStatus::Inactive,
        }
    }
}

/// The client-editable fields of an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPayload {
    pub name: String,
    pub persona: String,
    #[serde(default)]
    pub system_prompt: String,
    pub status: AgentStatus,
}

impl AgentPayload {
    pub fn new(name: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persona: persona.into(),
            system_prompt: String::new(),
            status: AgentStatus::default(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Field writes for the four mutable fields
    pub(crate) fn to_write(&self) -> DocumentWrite {
        let mut write = DocumentWrite::new();
        write.insert(fields::NAME.to_string(), self.name.clone().into());
        write.insert(fields::PERSONA.to_string(), self.persona.clone().into());
        write.insert(
            fields::SYSTEM_PROMPT.to_string(),
            self.system_prompt.clone().into(),
        );
        write.insert(fields::STATUS.to_string(), self.status.as_str().into());
        write
    }

    /// Writes for a new document: payload, zeroed counter, server timestamps
    pub(crate) fn to_create_write(&self) -> DocumentWrite {
        let mut write = self.to_write();
        write.insert(fields::CONVERSATION_COUNT.to_string(), 0u64.into());
        write.insert(fields::CREATED_AT.to_string(), FieldValue::ServerTimestamp);
        write.insert(fields::UPDATED_AT.to_string(), FieldValue::ServerTimestamp);
        write
    }

    /// Writes for an update: payload plus a refreshed updatedAt
    pub(crate) fn to_update_write(&self) -> DocumentWrite {
        let mut write = self.to_write();
        write.insert(fields::UPDATED_AT.to_string(), FieldValue::ServerTimestamp);
        write
    }
}

/// One agent in the collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub persona: String,
    pub system_prompt: String,
    pub status: AgentStatus,
    pub conversation_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AgentRecord {
    /// Parse a raw document, substituting defaults for anything missing
    pub fn from_document(doc: &RawDocument) -> Self {
        let text = |field: &str| -> String {
            doc.get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            id: doc.id.clone(),
            name: text(fields::NAME),
            persona: text(fields::PERSONA),
            system_prompt: text(fields::SYSTEM_PROMPT),
            status: doc
                .get(fields::STATUS)
                .and_then(Value::as_str)
                .map(AgentStatus::from)
                .unwrap_or_default(),
            conversation_count: parse_count(doc.get(fields::CONVERSATION_COUNT)),
            created_at: parse_timestamp(doc.get(fields::CREATED_AT)),
            updated_at: parse_timestamp(doc.get(fields::UPDATED_AT)),
        }
    }

    /// System prompt to drive a conversation, falling back to the persona
    pub fn effective_system_prompt(&self) -> &str {
        if self.system_prompt.trim().is_empty() {
            &self.persona
        } else {
            &self.system_prompt
        }
    }

    /// The editable part of this record
    pub fn payload(&self) -> AgentPayload {
        AgentPayload {
            name: self.name.clone(),
            persona: self.persona.clone(),
            system_prompt: self.system_prompt.clone(),
            status: self.status,
        }
    }
}

fn parse_count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or_else(|| match n.as_f64() {
            Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => f as u64,
            _ => 0,
        }),
        _ => 0,
    }
}
