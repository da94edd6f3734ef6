//! Decoding of JSON-fenced tool invocations from model output.
//!
//! The wire format is a fenced block tagged `json` containing an object with
//! a `tool` name and an `arguments` object. Anything that fails to parse, is
//! missing a key, or names an unknown tool is silently skipped; a malformed
//! block never aborts the turn.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Closed set of tools the model may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "execute_shell_command")]
    ExecuteShellCommand,
    #[serde(rename = "read_file")]
    ReadFile,
    #[serde(rename = "write_file")]
    WriteFile,
}

impl ToolName {
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "execute_shell_command" => Some(ToolName::ExecuteShellCommand),
            "read_file" => Some(ToolName::ReadFile),
            "write_file" => Some(ToolName::WriteFile),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            ToolName::ExecuteShellCommand => "execute_shell_command",
            ToolName::ReadFile => "read_file",
            ToolName::WriteFile => "write_file",
        }
    }
}

/// A structured invocation request decoded from one JSON block.
///
/// `id` is unique within a turn and correlates the eventual tool-result
/// message. Argument values are normalised to strings at this boundary so
/// downstream code never re-validates JSON shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: ToolName,
    pub arguments: HashMap<String, String>,
}

impl ToolInvocation {
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).map(|s| s.as_str())
    }
}

static JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*\n(.*?)\n```").unwrap());

/// Scan text for JSON-fenced tool invocations.
///
/// Ids are assigned sequentially (`call_0`, `call_1`, ...) in discovery
/// order; an `id` key inside the object is not part of the wire format and
/// is ignored.
pub fn decode(text: &str) -> Vec<ToolInvocation> {
    let mut invocations = Vec::new();

    for caps in JSON_BLOCK.captures_iter(text) {
        let block = caps.get(1).unwrap().as_str();

        let value: serde_json::Value = match serde_json::from_str(block) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let obj = match value.as_object() {
            Some(o) => o,
            None => continue,
        };

        let name = match obj
            .get("tool")
            .and_then(|t| t.as_str())
            .and_then(ToolName::from_wire)
        {
            Some(n) => n,
            None => continue,
        };

        let arguments = match obj.get("arguments").and_then(|a| a.as_object()) {
            Some(args) => args
                .iter()
                .map(|(k, v)| {
                    let s = match v.as_str() {
                        Some(s) => s.to_string(),
                        None => v.to_string(),
                    };
                    (k.clone(), s)
                })
                .collect(),
            None => continue,
        };

        invocations.push(ToolInvocation {
            id: format!("call_{}", invocations.len()),
            name,
            arguments,
        });
    }

    invocations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_read_file() {
        let text =
            "```json\n{\"tool\":\"read_file\",\"arguments\":{\"filepath\":\"x.txt\",\"reason\":\"r\"}}\n```";
        let calls = decode(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, ToolName::ReadFile);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].arg("filepath"), Some("x.txt"));
        assert_eq!(calls[0].arg("reason"), Some("r"));
    }

    #[test]
    fn test_decode_multiple_blocks_sequential_ids() {
        let text = "First:\n```json\n{\"tool\":\"read_file\",\"arguments\":{\"filepath\":\"a\",\"reason\":\"r\"}}\n```\nThen:\n```json\n{\"tool\":\"execute_shell_command\",\"arguments\":{\"command\":\"ls\",\"explanation\":\"list\"}}\n```";
        let calls = decode(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[1].id, "call_1");
        assert_eq!(calls[1].name, ToolName::ExecuteShellCommand);
    }

    #[test]
    fn test_invalid_json_skipped() {
        let text = "```json\n{not json at all\n```";
        assert!(decode(text).is_empty());
    }

    #[test]
    fn test_missing_keys_skipped() {
        let text = "```json\n{\"tool\":\"read_file\"}\n```";
        assert!(decode(text).is_empty());
        let text = "```json\n{\"arguments\":{\"filepath\":\"x\"}}\n```";
        assert!(decode(text).is_empty());
    }

    #[test]
    fn test_unknown_tool_skipped() {
        let text = "```json\n{\"tool\":\"launch_missiles\",\"arguments\":{}}\n```";
        assert!(decode(text).is_empty());
    }

    #[test]
    fn test_non_object_skipped() {
        let text = "```json\n[1, 2, 3]\n```";
        assert!(decode(text).is_empty());
    }

    #[test]
    fn test_bad_block_does_not_abort_turn() {
        let text = "```json\n{broken\n```\n```json\n{\"tool\":\"read_file\",\"arguments\":{\"filepath\":\"x\",\"reason\":\"y\"}}\n```";
        let calls = decode(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_0");
    }

    #[test]
    fn test_non_string_argument_values_stringified() {
        let text = "```json\n{\"tool\":\"execute_shell_command\",\"arguments\":{\"command\":\"sleep 1\",\"explanation\":\"wait\",\"retries\":3}}\n```";
        let calls = decode(text);
        assert_eq!(calls[0].arg("retries"), Some("3"));
    }

    #[test]
    fn test_plain_code_block_ignored() {
        let text = "```bash\nls -la\n```";
        assert!(decode(text).is_empty());
    }
}
