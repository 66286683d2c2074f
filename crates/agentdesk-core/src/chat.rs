// Agent test chat
//
// A ChatSession is the turn bookkeeping of the agent test screen: it loads
// one agent, keeps the locally displayed turns, derives the completion
// history from them and records failures as agent-side turns so the
// conversation keeps flowing. Nothing here is persisted.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::agent::AgentRecord;
use crate::collection_sync::CollectionSync;
use crate::config::CompletionOptions;
use crate::error::{CompletionError, DeskError, Result};
use crate::message::HistoryEntry;
use crate::turn::TurnAssembler;

/// Who wrote a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

/// A locally displayed message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub sent_at: DateTime<Utc>,
}

impl ConversationTurn {
    fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            text: text.into(),
            sender,
            sent_at: Utc::now(),
        }
    }

    /// Local wall-clock time as HH:MM
    pub fn display_time(&self) -> String {
        self.sent_at.with_timezone(&Local).format("%H:%M").to_string()
    }

    fn to_history(&self) -> HistoryEntry {
        match self.sender {
            Sender::User => HistoryEntry::user(self.text.clone()),
            Sender::Agent => HistoryEntry::assistant(self.text.clone()),
        }
    }
}

/// Outcome of one send
#[derive(Debug)]
pub struct ChatReply {
    /// The agent turn that was appended
    pub turn: ConversationTurn,
    /// Set when the turn carries an error message instead of a completion
    pub error: Option<CompletionError>,
}

impl ChatReply {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Conversation with one agent for the lifetime of a test screen
pub struct ChatSession {
    agent: AgentRecord,
    assembler: Arc<TurnAssembler>,
    api_key: Option<String>,
    options: CompletionOptions,
    turns: Vec<ConversationTurn>,
}

impl ChatSession {
    /// Start a session for an already loaded agent
    pub fn new(
        agent: AgentRecord,
        assembler: Arc<TurnAssembler>,
        api_key: Option<String>,
        options: CompletionOptions,
    ) -> Self {
        Self {
            agent,
            assembler,
            api_key,
            options,
            turns: Vec::new(),
        }
    }

    /// Load an agent through the collection and start a session for it
    pub async fn open(
        agents: &CollectionSync,
        agent_id: &str,
        assembler: Arc<TurnAssembler>,
        api_key: Option<String>,
        options: CompletionOptions,
    ) -> Result<Self> {
        let agent = agents
            .get(agent_id)
            .await?
            .ok_or_else(|| DeskError::agent_not_found(agent_id))?;
        Ok(Self::new(agent, assembler, api_key, options))
    }

    pub fn agent(&self) -> &AgentRecord {
        &self.agent
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Completion history derived from the displayed turns
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.turns.iter().map(ConversationTurn::to_history).collect()
    }

    /// Send a user message and append the agent's reply
    ///
    /// Blank input is ignored and returns `None`. Failures become an agent
    /// turn reading `Error: <message>`; the typed error is on the reply.
    /// `&mut self` keeps sends on one session strictly sequential.
    pub async fn send(&mut self, input: &str) -> Option<ChatReply> {
        if input.trim().is_empty() {
            return None;
        }

        let history = self.history();
        self.turns.push(ConversationTurn::new(input, Sender::User));

        let outcome = self
            .assembler
            .assemble_and_send(
                self.agent.effective_system_prompt(),
                &history,
                input,
                self.api_key.as_deref(),
                &self.options,
            )
            .await;

        let (text, error) = match outcome {
            Ok(text) => (text, None),
            Err(err) => (format!("Error: {err}"), Some(err)),
        };

        let turn = ConversationTurn::new(text, Sender::Agent);
        self.turns.push(turn.clone());
        Some(ChatReply { turn, error })
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("agent_id", &self.agent.id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("options", &self.options)
            .field("turns", &self.turns.len())
            .finish()
    }
}
