//! OpenAI-compatible chat completions backend.
//!
//! Talks to any server implementing `/v1/chat/completions` (LM Studio, vLLM,
//! llama.cpp server). Streaming arrives as SSE lines
//! `data: {"choices":[{"delta":{"content": ...}}]}` terminated by
//! `data: [DONE]`.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::base::{ModelBackend, StreamChunk, StreamHandle, REQUEST_TIMEOUT};

pub struct OpenAIBackend {
    base_url: String,
    model: String,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
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
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": stream,
        })
    }
}

/// One parsed SSE line.
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data: ") else {
        return SseLine::Skip;
    };
    if data.trim() == "[DONE]" {
        return SseLine::Done;
    }
    let chunk: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return SseLine::Skip,
    };
    let content = chunk
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or("");
    if content.is_empty() {
        SseLine::Skip
    } else {
        SseLine::Delta(content.to_string())
    }
}

#[async_trait]
impl ModelBackend for OpenAIBackend {
    async fn chat(
        &self,
        messages: &[serde_json::Value],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String> {
        let url = self.completions_url();
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

        let data: serde_json::Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => return Ok(format!("Error parsing LLM response: {}", e)),
        };

        match data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
        {
            Some(content) => Ok(content.to_string()),
            None => Ok("Error parsing LLM response: missing choices content".to_string()),
        }
    }

    async fn chat_stream(
        &self,
        messages: &[serde_json::Value],
        temperature: f64,
        max_tokens: u32,
        cancel: CancellationToken,
    ) -> Result<StreamHandle> {
        let url = self.completions_url();
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
                            warn!("SSE stream error: {}", e);
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

                    match parse_sse_line(&line) {
                        SseLine::Delta(text) => {
                            let _ = tx.send(StreamChunk::Delta(text));
                        }
                        SseLine::Done => {
                            let _ = tx.send(StreamChunk::Done);
                            return;
                        }
                        SseLine::Skip => {}
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
