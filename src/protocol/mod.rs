//! The text-based tool-call protocol.
//!
//! The model is not using a native function-calling API, so everything it
//! proposes arrives as free-form text. This module turns that text into
//! structured actions: [`extract`] finds shell-command candidates with layered
//! heuristics and confidence scoring, and [`toolcall`] decodes JSON-fenced
//! tool invocations.

pub mod extract;
pub mod toolcall;

pub use extract::{extract, CandidateOrigin, CommandCandidate};
pub use toolcall::{decode, ToolInvocation, ToolName};
