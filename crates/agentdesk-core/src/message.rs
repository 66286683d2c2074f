// Conversation message types
//
// ChatMessage is what goes out to the completion endpoint.
// HistoryEntry is what callers keep between turns; it has no system role,
// so the persona can only enter the outbound list once, at the front.

use serde::{Deserialize, Serialize};

/// Message role in an outbound conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message sent to the completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a prior turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

impl From<HistoryRole> for MessageRole {
    fn from(role: HistoryRole) -> Self {
        match role {
            HistoryRole::User => MessageRole::User,
            HistoryRole::Assistant => MessageRole::Assistant,
        }
    }
}

/// A prior turn in a conversation, oldest first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&HistoryEntry> for ChatMessage {
    fn from(entry: &HistoryEntry) -> Self {
        ChatMessage {
            role: entry.role.into(),
            content: entry.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        let msg = ChatMessage::assistant("Hi there");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "Hi there");
    }

    #[test]
    fn test_history_entry_converts_role() {
        let msg = ChatMessage::from(&HistoryEntry::user("hello"));
        assert_eq!(msg, ChatMessage::user("hello"));

        let msg = ChatMessage::from(&HistoryEntry::assistant("hey"));
        assert_eq!(msg.role, MessageRole::Assistant);
    }

    #[test]
    fn test_history_role_rejects_system() {
        let parsed: Result<HistoryEntry, _> =
            serde_json::from_str(r#"{"role":"system","content":"x"}"#);
        assert!(parsed.is_err());
    }
}
