//! Configuration structures.
//!
//! Constructed once at startup and passed by reference to the components that
//! need it; there is no ambient global configuration.

use serde::{Deserialize, Serialize};

/// A single configured LLM server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub url: String,
    pub models: Vec<String>,
}

/// Default generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// HTTP API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

fn default_servers() -> Vec<ServerConfig> {
    vec![ServerConfig {
        name: "Ollama Local".to_string(),
        url: "http://localhost:11434".to_string(),
        models: vec!["mistral-7b".to_string(), "llama2".to_string()],
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            generation: GenerationConfig::default(),
            api: ApiConfig::default(),
        }
    }
}
