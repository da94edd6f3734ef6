//! termagent - chat with a locally hosted LLM from the terminal, with
//! command suggestions and human-approved tool execution.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use termagent::config::{load_config, Config};
use termagent::personas::{Persona, Verbosity};
use termagent::providers::{ModelBackend, NativeBackend, OpenAIBackend};
use termagent::repl::Repl;
use termagent::server;
use termagent::session::SessionConfig;

#[derive(Parser)]
#[command(name = "termagent", about = "Terminal agent for local LLM servers", version)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive chat loop.
    Chat {
        /// LLM server base URL (defaults to the first configured server).
        #[arg(long)]
        url: Option<String>,
        /// Model name (defaults to the server's first model).
        #[arg(long)]
        model: Option<String>,
        /// Expert persona: linux, python, devops, database, general.
        #[arg(long, default_value = "linux")]
        expert: String,
        /// Response mode: quick or full.
        #[arg(long, default_value = "quick")]
        mode: String,
        /// Use the native generate API instead of the OpenAI-compatible one.
        #[arg(long)]
        native: bool,
    },
    /// Start the HTTP API server.
    Serve {
        /// Bind host (overrides config).
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config).
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn,rustyline=warn")
        });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config: Config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Chat {
            url,
            model,
            expert,
            mode,
            native,
        } => {
            let persona = Persona::from_name(&expert)
                .ok_or_else(|| anyhow::anyhow!("unknown expert: {}", expert))?;
            let verbosity = Verbosity::from_name(&mode)
                .ok_or_else(|| anyhow::anyhow!("unknown mode: {} (use quick|full)", mode))?;

            let server = config
                .servers
                .first()
                .ok_or_else(|| anyhow::anyhow!("no LLM servers configured"))?;
            let url = url.unwrap_or_else(|| server.url.clone());
            let model = match model {
                Some(m) => m,
                None => server
                    .models
                    .first()
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no models configured for {}", server.name))?,
            };

            let backend: Arc<dyn ModelBackend> = if native {
                Arc::new(NativeBackend::new(&url, &model))
            } else {
                Arc::new(OpenAIBackend::new(&url, &model))
            };

            let session = SessionConfig {
                persona,
                verbosity,
                temperature: None,
                max_tokens: None,
            };
            Repl::new(backend, session)?.run().await
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            server::serve(&config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_chat_defaults() {
        let cli = Cli::try_parse_from(["termagent", "chat"]).unwrap();
        match cli.command {
            Commands::Chat {
                url,
                model,
                expert,
                mode,
                native,
            } => {
                assert!(url.is_none());
                assert!(model.is_none());
                assert_eq!(expert, "linux");
                assert_eq!(mode, "quick");
                assert!(!native);
            }
            _ => panic!("expected chat command"),
        }
    }

    #[test]
    fn test_cli_parses_chat_with_overrides() {
        let cli = Cli::try_parse_from([
            "termagent",
            "chat",
            "--url",
            "http://localhost:1234",
            "--model",
            "qwen",
            "--expert",
            "database",
            "--mode",
            "full",
            "--native",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat {
                url,
                model,
                expert,
                mode,
                native,
            } => {
                assert_eq!(url.as_deref(), Some("http://localhost:1234"));
                assert_eq!(model.as_deref(), Some("qwen"));
                assert_eq!(expert, "database");
                assert_eq!(mode, "full");
                assert!(native);
            }
            _ => panic!("expected chat command"),
        }
    }

    #[test]
    fn test_cli_parses_serve() {
        let cli = Cli::try_parse_from(["termagent", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Commands::Serve { host, port } => {
                assert!(host.is_none());
                assert_eq!(port, Some(9000));
            }
            _ => panic!("expected serve command"),
        }
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli = Cli::try_parse_from(["termagent", "chat", "--config", "alt.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.yaml")));
    }
}
