//! Minimal HTTP front-end over the model backend.
//!
//! Exposes the same chat capability as the REPL without the interactive
//! surface: a banner, a health check, and a single-turn `/chat` endpoint
//! backed by the first configured server.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::providers::{ModelBackend, NativeBackend};

struct AppState {
    backend: Arc<dyn ModelBackend>,
    default_temperature: f64,
    default_max_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

pub fn build_router(backend: Arc<dyn ModelBackend>, config: &Config) -> Router {
    let state = Arc::new(AppState {
        backend,
        default_temperature: config.generation.temperature,
        default_max_tokens: config.generation.max_tokens,
    });

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .with_state(state)
}

/// Serve the API using the first configured server's first model.
pub async fn serve(config: &Config) -> Result<()> {
    let server = config
        .servers
        .first()
        .ok_or_else(|| anyhow::anyhow!("no LLM servers configured"))?;
    let model = server
        .models
        .first()
        .ok_or_else(|| anyhow::anyhow!("server '{}' has no models configured", server.name))?;

    let backend: Arc<dyn ModelBackend> = Arc::new(NativeBackend::new(&server.url, model));
    let router = build_router(backend, config);

    let addr = format!("{}:{}", config.api.host, config.api.port);
    info!("listening on {} (backend: {})", addr, server.url);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({"message": "Terminal Agent API is running"}))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy"}))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let messages = vec![serde_json::json!({"role": "user", "content": request.message})];
    let temperature = request.temperature.unwrap_or(state.default_temperature);
    let max_tokens = request.max_tokens.unwrap_or(state.default_max_tokens);

    // Backend failures come back as displayable text, so this handler has no
    // error branch.
    let response = state
        .backend
        .chat(&messages, temperature, max_tokens)
        .await
        .unwrap_or_else(|e| format!("Error communicating with LLM: {}", e));

    Json(ChatResponse { response })
}
