//! Tool failure classification.
//!
//! Tool results travel as strings so they can be relayed to the model
//! verbatim. For logging, [`classify_tool_error`] maps known failure strings
//! back onto a typed [`ToolError`].

use thiserror::Error;

/// Categorised tool failure reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Classify a tool failure string into a [`ToolError`].
///
/// Matches on known substrings. Returns `None` for unrecognised patterns;
/// the caller still has the raw string.
pub fn classify_tool_error(error_msg: &str) -> Option<ToolError> {
    let lower = error_msg.to_lowercase();

    if lower.contains("no such file")
        || lower.contains("file not found")
        || lower.contains("does not exist")
    {
        return Some(ToolError::FileNotFound(error_msg.to_string()));
    }

    if lower.contains("permission denied") {
        return Some(ToolError::PermissionDenied(error_msg.to_string()));
    }

    if lower.contains("invalid") || lower.contains("missing required") {
        return Some(ToolError::InvalidArgs(error_msg.to_string()));
    }

    if lower.starts_with("exit code") {
        return Some(ToolError::ExecutionFailed(error_msg.to_string()));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_file_not_found() {
        let kind = classify_tool_error("File not found: /tmp/missing.txt");
        assert!(matches!(kind, Some(ToolError::FileNotFound(_))));
    }

    #[test]
    fn test_classify_permission_denied() {
        let kind = classify_tool_error("Permission denied: /etc/shadow");
        assert!(matches!(kind, Some(ToolError::PermissionDenied(_))));
    }

    #[test]
    fn test_classify_nonzero_exit() {
        let kind = classify_tool_error("Exit code: 2\nStdout:\n\nStderr:\nbad flag");
        assert!(matches!(kind, Some(ToolError::ExecutionFailed(_))));
    }

    #[test]
    fn test_classify_unrecognised() {
        assert_eq!(classify_tool_error("something odd happened"), None);
    }

    #[test]
    fn test_classify_invalid_arguments() {
        let kind = classify_tool_error("Invalid value for working_directory");
        assert!(matches!(kind, Some(ToolError::InvalidArgs(_))));
    }
}
