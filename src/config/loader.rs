//! Configuration loading utilities.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::schema::Config;

/// Default configuration file path (`config.yaml` in the working directory).
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.yaml")
}

/// Load configuration from a YAML file, or return a default [`Config`] if the
/// file does not exist or cannot be parsed.
///
/// If `config_path` is `None`, `config.yaml` in the working directory is used.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path(),
    };

    if path.exists() {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        "Failed to parse config from {}: {}. Using default configuration.",
                        path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read config from {}: {}. Using default configuration.",
                    path.display(),
                    e
                );
            }
        }
    }

    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/termagent_test_does_not_exist_987654.yaml");
        let cfg = load_config(Some(path));
        assert_eq!(cfg.api.port, 8000);
        assert_eq!(cfg.servers[0].name, "Ollama Local");
    }

    #[test]
    fn test_load_valid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "servers:\n  - name: Local\n    url: http://127.0.0.1:8080\n    models: [m1, m2]\ngeneration:\n  temperature: 0.3\n  max_tokens: 512\napi:\n  host: 127.0.0.1\n  port: 9000\n",
        )
        .unwrap();

        let cfg = load_config(Some(&path));
        assert_eq!(cfg.servers[0].models, vec!["m1", "m2"]);
        assert_eq!(cfg.generation.temperature, 0.3);
        assert_eq!(cfg.api.port, 9000);
    }

    #[test]
    fn test_load_broken_yaml_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "servers: [not: {valid").unwrap();

        let cfg = load_config(Some(&path));
        assert_eq!(cfg.generation.max_tokens, 2000);
    }
}
