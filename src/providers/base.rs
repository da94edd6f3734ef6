//! Base model backend interface.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Request timeout for backend HTTP calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A chunk from a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Incremental text from the model.
    Delta(String),
    /// Stream complete.
    Done,
}

/// Handle to a streaming model response.
pub struct StreamHandle {
    pub rx: tokio::sync::mpsc::UnboundedReceiver<StreamChunk>,
}

/// Abstract interface over LLM server dialects.
///
/// Messages are `{"role": ..., "content": ...}` JSON objects. Transport and
/// parse failures are returned as human-readable *content*, never as `Err`,
/// so a dead server degrades into an inline error message in the chat.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Send a buffered chat request and return the full response text.
    async fn chat(
        &self,
        messages: &[serde_json::Value],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String>;

    /// Send a streaming chat request.
    ///
    /// The reader task stops iterating when `cancel` fires; any fragments
    /// buffered but not yet yielded at that point are discarded. The default
    /// implementation falls back to buffered `chat()`.
    async fn chat_stream(
        &self,
        messages: &[serde_json::Value],
        temperature: f64,
        max_tokens: u32,
        cancel: CancellationToken,
    ) -> Result<StreamHandle> {
        let _ = cancel;
        let content = self.chat(messages, temperature, max_tokens).await?;
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        if !content.is_empty() {
            let _ = tx.send(StreamChunk::Delta(content));
        }
        let _ = tx.send(StreamChunk::Done);
        Ok(StreamHandle { rx })
    }

    /// Model identifier sent with every request.
    fn model(&self) -> &str;

    /// Server base URL (for health checks and status display).
    fn base_url(&self) -> &str;
}

/// Extract the `content` string from a message object.
pub(crate) fn message_content(msg: &serde_json::Value) -> &str {
    msg.get("content").and_then(|c| c.as_str()).unwrap_or("")
}

/// Extract the `role` string from a message object.
pub(crate) fn message_role(msg: &serde_json::Value) -> &str {
    msg.get("role").and_then(|r| r.as_str()).unwrap_or("")
}
