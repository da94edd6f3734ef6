//! Native generate-API backend (Ollama-style `/api/generate`).
//!
//! The conversation is flattened into a single instruct-formatted prompt and
//! the server streams back newline-delimited JSON fragments
//! `{"response": ..., "done": ...}` terminated by `done: true`.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::base::{
    message_content, message_role, ModelBackend, StreamChunk, StreamHandle, REQUEST_TIMEOUT,
};

pub struct NativeBackend {
    base_url: String,
    model: String,
    client: Client,
}

impl NativeBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn payload(
        &self,
        messages: &[serde_json::Value],
        temperature: f64,
        max_tokens: u32,
        stream: bool,
    ) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": build_instruct_prompt(messages),
            "stream": stream,
            "temperature": temperature,
            "num_predict": max_tokens,
        })
    }
}

/// Flatten a role-tagged message list into an instruct prompt.
///
/// The system message becomes a `<<SYS>>...<</SYS>>` block separated from the
/// conversation by one blank line. Closed turns alternate
/// `[INST] user [/INST] assistant`, the awaiting turn ends with an open
/// `[INST] user [/INST]`, all space-joined.
pub fn build_instruct_prompt(messages: &[serde_json::Value]) -> String {
    let mut system = String::new();
    let mut parts: Vec<String> = Vec::new();

    for msg in messages {
        let content = message_content(msg);
        match message_role(msg) {
            "system" => {
                if system.is_empty() {
                    system = content.to_string();
                }
            }
            "user" => parts.push(format!("[INST] {} [/INST]", content)),
            "assistant" => parts.push(content.to_string()),
            _ => {}
        }
    }

    let conversation = parts.join(" ");
    if system.is_empty() {
        conversation
    } else {
        format!("<<SYS>>{}<</SYS>>\n\n{}", system, conversation)
    }
}

/// Parse one NDJSON fragment line into `(text, done)`.
///
/// Returns `None` for blank or malformed lines, which are skipped.
fn parse_fragment(line: &str) -> Option<(String, bool)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let data: serde_json::Value = serde_json::from_str(line).ok()?;
    let text = data
        .get("response")
        .and_then(|r| r.as_str())
        .unwrap_or("")
        .to_string();
    let done = data.get("done").and_then(|d| d.as_bool()).unwrap_or(false);
    Some((text, done))
}

#[async_trait]
impl ModelBackend for NativeBackend {
    async fn chat(
        &self,
        messages: &[serde_json::Value],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String> {
        let url = self.generate_url();
        debug!("chat: url={} model={}", url, self.model);

        let response = match self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&self.payload(messages, temperature, max_tokens, false))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!("request to {} timed out", self.base_url);
                return Ok(format!(
                    "Error: Request to LLM server timed out at {}",
                    self.base_url
                ));
            }
            Err(e) if e.is_connect() => {
                warn!("cannot connect to {}: {}", self.base_url, e);
                return Ok(format!(
                    "Error: Cannot connect to LLM server at {}. Is the server running?",
                    self.base_url
                ));
            }
            Err(e) => return Ok(format!("Error communicating with LLM: {}", e)),
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!("LLM server returned status {}: {}", status, body);
            return Ok(format!(
                "Error: LLM server returned status {}: {}",
                status.as_u16(),
                body
            ));
        }

        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(data) => Ok(data
                .get("response")
                .and_then(|r| r.as_str())
                .unwrap_or("")
                .to_string()),
            Err(e) => Ok(format!("Error parsing LLM response: {}", e)),
        }
    }

    async fn chat_stream(
        &self,
        messages: &[serde_json::Value],
        temperature: f64,
        max_tokens: u32,
        cancel: CancellationToken,
    ) -> Result<StreamHandle> {
        let url = self.generate_url();
        debug!("chat_stream: url={} model={}", url, self.model);

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let response = match self
            .client
            .post(&url)
            .json(&self.payload(messages, temperature, max_tokens, true))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let message = if e.is_connect() {
                    format!(
                        "Error: Cannot connect to LLM server at {}. Is the server running?",
                        self.base_url
                    )
                } else {
                    format!("\nError communicating with LLM: {}", e)
                };
                let _ = tx.send(StreamChunk::Delta(message));
                let _ = tx.send(StreamChunk::Done);
                return Ok(StreamHandle { rx });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("LLM streaming API returned status {}: {}", status, body);
            let _ = tx.send(StreamChunk::Delta(format!(
                "Error: LLM server returned status {}: {}",
                status.as_u16(),
                body
            )));
            let _ = tx.send(StreamChunk::Done);
            return Ok(StreamHandle { rx });
        }

        let mut byte_stream = response.bytes_stream();
        tokio::spawn(async move {
            let mut line_buffer = String::new();
            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = byte_stream.next() => item,
                };
                let bytes = match item {
                    Some(Ok(b)) => b,
                    Some(Err(e)) => {
                        if !cancel.is_cancelled() {
                            warn!("NDJSON stream error: {}", e);
                            let _ = tx.send(StreamChunk::Delta(format!(
                                "\nError communicating with LLM: {}",
                                e
                            )));
                        }
                        break;
                    }
                    None => break,
                };

                line_buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = line_buffer.find('\n') {
                    let line = line_buffer[..pos].to_string();
                    line_buffer = line_buffer[pos + 1..].to_string();

                    if let Some((text, done)) = parse_fragment(&line) {
                        if !text.is_empty() {
                            let _ = tx.send(StreamChunk::Delta(text));
                        }
                        if done {
                            let _ = tx.send(StreamChunk::Done);
                            return;
                        }
                    }
                }
            }
            let _ = tx.send(StreamChunk::Done);
        });

        Ok(StreamHandle { rx })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
