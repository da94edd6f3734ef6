//! Configuration schema and loading.

pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config};
pub use schema::{ApiConfig, Config, GenerationConfig, ServerConfig};
