//! Conversation session: ordered history, persona-aware prompting, and
//! streaming turns with cooperative cancellation.
//!
//! The session owns the message history and turns one backend stream into a
//! channel of [`ChatEvent`]s. Tool invocations are decoded only from the
//! complete accumulated text after streaming ends, never from partial
//! fragments. On cancellation the caller rolls back the trailing user message
//! so history never contains an orphaned user turn.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::personas::{system_prompt, Persona, Verbosity};
use crate::protocol::{decode, ToolInvocation};
use crate::providers::{ModelBackend, StreamChunk};

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One message in the conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Correlating invocation id, set for tool results only.
    pub tool_call_id: Option<String>,
    pub tool_name: Option<String>,
}

impl ConversationMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    fn to_wire(&self) -> serde_json::Value {
        match self.role {
            Role::Tool => serde_json::json!({
                "role": "tool",
                "tool_call_id": self.tool_call_id.as_deref().unwrap_or(""),
                "name": self.tool_name.as_deref().unwrap_or(""),
                "content": self.content,
            }),
            _ => serde_json::json!({
                "role": self.role.as_wire(),
                "content": self.content,
            }),
        }
    }
}

/// Per-session generation settings. Explicit overrides win over the
/// persona/verbosity defaults.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub persona: Persona,
    pub verbosity: Verbosity,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persona: Persona::General,
            verbosity: Verbosity::Full,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// One event from a streaming turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Incremental response text.
    Text(String),
    /// A decoded tool invocation, emitted after streaming completes.
    ToolCall(ToolInvocation),
    /// The turn was cancelled; no further events follow.
    Cancelled,
}

pub struct ChatSession {
    backend: Arc<dyn ModelBackend>,
    config: SessionConfig,
    history: Vec<ConversationMessage>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ModelBackend>, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            history: Vec::new(),
        }
    }

    pub fn persona(&self) -> Persona {
        self.config.persona
    }

    pub fn verbosity(&self) -> Verbosity {
        self.config.verbosity
    }

    pub fn history(&self) -> &[ConversationMessage] {
        &self.history
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    /// Effective sampling temperature: explicit override, else persona default.
    pub fn temperature(&self) -> f64 {
        self.config
            .temperature
            .unwrap_or_else(|| self.config.persona.temperature())
    }

    /// Effective token budget: explicit override, else persona+verbosity default.
    pub fn max_tokens(&self) -> u32 {
        self.config
            .max_tokens
            .unwrap_or_else(|| self.config.persona.max_tokens(self.config.verbosity))
    }

    /// Switch persona. Clears the entire history so answers from the previous
    /// specialisation cannot contaminate the new one, then installs a fresh
    /// system message.
    pub fn set_persona(&mut self, persona: Persona) {
        self.config.persona = persona;
        self.history.clear();
        self.ensure_system_message();
    }

    /// Switch verbosity. Regenerates the system message in place, inserting
    /// one if absent; history is kept.
    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.config.verbosity = verbosity;
        match self.history.first_mut() {
            Some(first) if first.role == Role::System => {
                first.content = system_prompt(self.config.persona, verbosity);
            }
            _ => self.ensure_system_message(),
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Insert the system message at index 0 if absent. At most one system
    /// message exists, always first.
    fn ensure_system_message(&mut self) {
        let missing = self
            .history
            .first()
            .map_or(true, |m| m.role != Role::System);
        if missing {
            self.history.insert(
                0,
                ConversationMessage::new(
                    Role::System,
                    system_prompt(self.config.persona, self.config.verbosity),
                ),
            );
        }
    }

    /// Append a user turn. The very first user message in a fresh session is
    /// prefixed with a persona tag, which helps models with weak
    /// system-prompt adherence stay in character.
    pub fn add_user_message(&mut self, content: &str) {
        let is_first_user = !self.history.iter().any(|m| m.role == Role::User);
        let content = if is_first_user {
            format!("[You are {}] {}", self.config.persona.name(), content)
        } else {
            content.to_string()
        };
        self.history.push(ConversationMessage::new(Role::User, content));
    }

    pub fn add_assistant_message(&mut self, content: &str) {
        self.history
            .push(ConversationMessage::new(Role::Assistant, content));
    }

    pub fn add_tool_result(&mut self, tool_call_id: &str, tool_name: &str, result: &str) {
        self.history.push(ConversationMessage {
            role: Role::Tool,
            content: result.to_string(),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_name: Some(tool_name.to_string()),
        });
    }

    /// Pop the trailing user message after a cancelled turn.
    pub fn rollback_user_message(&mut self) {
        if self.history.last().map_or(false, |m| m.role == Role::User) {
            self.history.pop();
        }
    }

    /// Run one buffered turn against the backend and return the full
    /// response text. Used for short follow-ups after a tool result, where
    /// streaming adds nothing.
    pub async fn complete_turn(&mut self) -> Result<String> {
        self.ensure_system_message();
        let wire: Vec<serde_json::Value> = self.history.iter().map(|m| m.to_wire()).collect();
        self.backend
            .chat(&wire, self.temperature(), self.max_tokens())
            .await
    }

    /// Run one streaming turn against the backend.
    ///
    /// `cancel` is the per-turn token; a child of it is handed to the
    /// transport reader so cancelling the turn also stops the HTTP stream.
    /// The token is checked before every event yield, so text buffered after
    /// cancellation is discarded rather than delivered.
    pub async fn stream_turn(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<tokio::sync::mpsc::UnboundedReceiver<ChatEvent>> {
        self.ensure_system_message();

        let wire: Vec<serde_json::Value> = self.history.iter().map(|m| m.to_wire()).collect();
        let temperature = self.temperature();
        let max_tokens = self.max_tokens();
        debug!(
            "stream_turn: persona={} temperature={} max_tokens={} history_len={}",
            self.config.persona.id(),
            temperature,
            max_tokens,
            wire.len()
        );

        let mut handle = self
            .backend
            .chat_stream(&wire, temperature, max_tokens, cancel.child_token())
            .await?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut accumulated = String::new();

            while let Some(chunk) = handle.rx.recv().await {
                if cancel.is_cancelled() {
                    let _ = tx.send(ChatEvent::Cancelled);
                    return;
                }
                match chunk {
                    StreamChunk::Delta(text) => {
                        accumulated.push_str(&text);
                        let _ = tx.send(ChatEvent::Text(text));
                    }
                    StreamChunk::Done => break,
                }
            }

            if cancel.is_cancelled() {
                let _ = tx.send(ChatEvent::Cancelled);
                return;
            }

            for invocation in decode(&accumulated) {
                let _ = tx.send(ChatEvent::ToolCall(invocation));
            }
        });

        Ok(rx)
    }
}
