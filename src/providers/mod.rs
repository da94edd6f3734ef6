//! Model backends for locally hosted LLM servers.
//!
//! Two wire dialects are supported: the native generate API (NDJSON
//! fragments) and the OpenAI-compatible chat completions API (SSE deltas).
//! Transport failures surface as displayable text instead of errors so the
//! conversation can continue against a flaky local server.

pub mod base;
pub mod native;
pub mod openai;

pub use base::{ModelBackend, StreamChunk, StreamHandle};
pub use native::NativeBackend;
pub use openai::OpenAIBackend;
