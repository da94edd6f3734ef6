//! termagent library — terminal front-end for locally hosted LLM servers
//! with human-approved command execution.

pub mod config;
pub mod errors;
pub mod executor;
pub mod personas;
pub mod protocol;
pub mod providers;
pub mod repl;
pub mod server;
pub mod session;
pub mod syntax;
pub mod tui;
