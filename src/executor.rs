//! Tool execution with a human approval gate and an audit log.
//!
//! Every invocation goes `Proposed -> {Approved, Modified, Skipped}` and then,
//! when approved, `-> {Executed, Failed}`. Approval is a human-in-the-loop
//! gate, not a security sandbox. Execution failures never propagate as fatal
//! errors to the interactive loop; they are captured as `(false, message)`
//! results so the conversation can continue.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::classify_tool_error;
use crate::protocol::ToolName;
use crate::syntax;
use crate::tui;

/// What the user decided at the approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalChoice {
    Execute,
    Modify,
    Skip,
}

/// Human decision source for the approval gate.
///
/// Production reads stdin; tests script the answers.
pub trait Approver: Send {
    /// Present the execute/modify/skip choice.
    fn choose(&mut self) -> ApprovalChoice;

    /// Prompt for a replacement value of the primary argument. `None` means
    /// the modification was cancelled.
    fn prompt_value(&mut self, label: &str, default: &str) -> Option<String>;

    /// Ask a yes/no question with a default answer.
    fn confirm(&mut self, question: &str, default: bool) -> bool;
}

/// Stdin-backed approver.
pub struct StdinApprover;

impl StdinApprover {
    fn read_line() -> Option<String> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => None, // EOF
            Ok(_) => Some(line.trim().to_string()),
            Err(_) => None,
        }
    }
}

impl Approver for StdinApprover {
    fn choose(&mut self) -> ApprovalChoice {
        loop {
            print!("\n{}Action{} (execute/modify/skip) [execute]: ", tui::BOLD, tui::RESET);
            io::stdout().flush().ok();
            let line = match Self::read_line() {
                Some(l) => l.to_lowercase(),
                None => return ApprovalChoice::Skip,
            };
            match line.as_str() {
                "" | "e" | "execute" => return ApprovalChoice::Execute,
                "m" | "modify" => return ApprovalChoice::Modify,
                "s" | "skip" => return ApprovalChoice::Skip,
                other => println!("{}", tui::warn(&format!("Unknown choice: {}", other))),
            }
        }
    }

    fn prompt_value(&mut self, label: &str, default: &str) -> Option<String> {
        print!("{} [{}]: ", label, default);
        io::stdout().flush().ok();
        let line = Self::read_line()?;
        if line.is_empty() {
            Some(default.to_string())
        } else {
            Some(line)
        }
    }

    fn confirm(&mut self, question: &str, default: bool) -> bool {
        let hint = if default { "Y/n" } else { "y/N" };
        print!("{} [{}]: ", question, hint);
        io::stdout().flush().ok();
        match Self::read_line() {
            Some(line) if line.is_empty() => default,
            Some(line) => matches!(line.to_lowercase().as_str(), "y" | "yes"),
            None => default,
        }
    }
}

/// What kind of action an [`ExecutionRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    ShellCommand,
    FileRead,
    FileWrite,
}

impl From<ToolName> for ActionKind {
    fn from(name: ToolName) -> Self {
        match name {
            ToolName::ExecuteShellCommand => ActionKind::ShellCommand,
            ToolName::ReadFile => ActionKind::FileRead,
            ToolName::WriteFile => ActionKind::FileWrite,
        }
    }
}

/// Terminal outcome of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Skipped,
    UserCancelled,
}

/// One entry in the append-only, process-lifetime audit log.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub kind: ActionKind,
    pub input: HashMap<String, String>,
    pub outcome: Outcome,
    pub output: Option<String>,
}

/// Maximum characters of file content shown in the write-file preview.
const CONTENT_PREVIEW_CHARS: usize = 300;

/// Executes approved tool invocations and records every outcome.
pub struct ToolExecutor {
    working_directory: PathBuf,
    approver: Box<dyn Approver>,
    records: Vec<ExecutionRecord>,
}

impl ToolExecutor {
    pub fn new(approver: Box<dyn Approver>) -> Self {
        Self {
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            approver,
            records: Vec::new(),
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    /// Append-only audit log of every execution, skip, and cancellation.
    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// Execute a tool invocation with user approval.
    ///
    /// Returns `(success, result_text)`. The result text is populated even on
    /// failure so the caller can relay it to the model.
    pub async fn execute_with_approval(
        &mut self,
        name: ToolName,
        arguments: &HashMap<String, String>,
        auto_approve: bool,
    ) -> (bool, Option<String>) {
        println!();
        println!(
            "{}",
            tui::panel(
                &format!("Tool: {}", name.as_wire()),
                &format_tool_preview(name, arguments)
            )
        );

        let mut arguments = arguments.clone();

        if !auto_approve {
            match self.approver.choose() {
                ApprovalChoice::Execute => {}
                ApprovalChoice::Modify => match self.modify_arguments(name, &arguments) {
                    Some(modified) => arguments = modified,
                    None => {
                        self.record(name, &arguments, Outcome::UserCancelled, None);
                        return (false, Some("Modification cancelled".to_string()));
                    }
                },
                ApprovalChoice::Skip => {
                    println!("{}", tui::warn("Skipped"));
                    self.record(name, &arguments, Outcome::Skipped, None);
                    return (false, Some("Skipped by user".to_string()));
                }
            }
        }

        let (success, result) = match name {
            ToolName::ExecuteShellCommand => self.run_shell_command(&arguments).await,
            ToolName::ReadFile => self.read_file(&arguments),
            ToolName::WriteFile => self.write_file(&arguments),
        };

        let outcome = if success {
            Outcome::Success
        } else if result.as_deref() == Some("User cancelled overwrite") {
            Outcome::UserCancelled
        } else {
            Outcome::Failure
        };
        if outcome == Outcome::Failure {
            match result.as_deref().and_then(classify_tool_error) {
                Some(kind) => warn!("{} failed: {}", name.as_wire(), kind),
                None => warn!("{} failed", name.as_wire()),
            }
        }
        self.record(name, &arguments, outcome, result.clone());

        (success, result)
    }

    fn record(
        &mut self,
        name: ToolName,
        input: &HashMap<String, String>,
        outcome: Outcome,
        output: Option<String>,
    ) {
        self.records.push(ExecutionRecord {
            kind: name.into(),
            input: input.clone(),
            outcome,
            output,
        });
    }

    /// Re-prompt for the primary argument (command text or file path).
    fn modify_arguments(
        &mut self,
        name: ToolName,
        arguments: &HashMap<String, String>,
    ) -> Option<HashMap<String, String>> {
        println!("\n{}Modify arguments:{}", tui::BOLD, tui::RESET);
        let mut new_args = arguments.clone();

        let key = match name {
            ToolName::ExecuteShellCommand => "command",
            ToolName::ReadFile | ToolName::WriteFile => "filepath",
        };
        let label = match name {
            ToolName::ExecuteShellCommand => "Command",
            ToolName::ReadFile | ToolName::WriteFile => "File path",
        };
        let default = arguments.get(key).cloned().unwrap_or_default();

        let value = self.approver.prompt_value(label, &default)?;
        if !value.is_empty() {
            new_args.insert(key.to_string(), value);
        }
        Some(new_args)
    }

    /// Run the command string through a subprocess shell, capturing output.
    ///
    /// Not time-bounded: the operator watches and interrupts long-running
    /// commands (only the `!command` fast path in the REPL has a timeout).
    async fn run_shell_command(&self, arguments: &HashMap<String, String>) -> (bool, Option<String>) {
        let command = arguments.get("command").cloned().unwrap_or_default();
        let working_dir = arguments
            .get("working_directory")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.working_directory.clone());

        println!("\n{}Executing in: {}{}", tui::DIM, working_dir.display(), tui::RESET);
        println!("{}Running...{}", tui::CYAN, tui::RESET);
        debug!("shell command: {}", command);

        let output = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&working_dir)
            .output()
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!("failed to spawn shell command: {}", e);
                println!("{}", tui::err(&e.to_string()));
                return (false, Some(e.to_string()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if !stdout.is_empty() {
            println!("\n{}Output:{}", tui::BOLD, tui::RESET);
            println!("{}", stdout);
        }
        if !stderr.is_empty() {
            println!("\n{}Stderr:{}", tui::YELLOW, tui::RESET);
            println!("{}", stderr);
        }

        let success = exit_code == 0;
        if success {
            println!("{}", tui::ok("Command executed successfully"));
        } else {
            println!("{}", tui::err(&format!("Command failed with exit code {}", exit_code)));
        }

        let result = format!(
            "Exit code: {}\nStdout:\n{}\nStderr:\n{}",
            exit_code, stdout, stderr
        );
        (success, Some(result))
    }

    fn read_file(&self, arguments: &HashMap<String, String>) -> (bool, Option<String>) {
        let filepath = arguments.get("filepath").cloned().unwrap_or_default();
        let path = Path::new(&filepath);

        if !path.is_file() {
            println!("{}", tui::err(&format!("File not found: {}", filepath)));
            return (false, Some(format!("File not found: {}", filepath)));
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                println!("{}", tui::err(&format!("Error reading file: {}", e)));
                return (false, Some(e.to_string()));
            }
        };

        println!("\n{}File: {}{} ({} chars)", tui::BOLD, filepath, tui::RESET, content.len());
        let lang = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        print!("{}", syntax::highlight(&content, lang));
        println!("\n{}", tui::ok("File read successfully"));

        (true, Some(content))
    }

    fn write_file(&mut self, arguments: &HashMap<String, String>) -> (bool, Option<String>) {
        let filepath = arguments.get("filepath").cloned().unwrap_or_default();
        let content = arguments.get("content").cloned().unwrap_or_default();
        let path = Path::new(&filepath);

        let exists = path.exists();
        if exists {
            println!("{}", tui::warn(&format!("File exists: {}", filepath)));
            if !self.approver.confirm("Overwrite?", false) {
                return (false, Some("User cancelled overwrite".to_string()));
            }
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    println!("{}", tui::err(&format!("Error writing file: {}", e)));
                    return (false, Some(e.to_string()));
                }
            }
        }

        if let Err(e) = std::fs::write(path, &content) {
            println!("{}", tui::err(&format!("Error writing file: {}", e)));
            return (false, Some(e.to_string()));
        }

        let action = if exists { "Updated" } else { "Created" };
        println!("{}", tui::ok(&format!("{} file: {}", action, filepath)));
        (true, Some(format!("{} {}", action, filepath)))
    }
}

/// Kind-specific preview shown inside the approval panel.
fn format_tool_preview(name: ToolName, arguments: &HashMap<String, String>) -> String {
    let get = |k: &str| arguments.get(k).map(|s| s.as_str()).unwrap_or("");

    match name {
        ToolName::ExecuteShellCommand => {
            let mut out = format!(
                "Command: {}\n\nExplanation:\n{}",
                get("command"),
                get("explanation")
            );
            if let Some(wd) = arguments.get("working_directory") {
                out.push_str(&format!("\n\nWorking Directory: {}", wd));
            }
            out
        }
        ToolName::ReadFile => format!(
            "File: {}\n\nReason:\n{}",
            get("filepath"),
            get("reason")
        ),
        ToolName::WriteFile => {
            let content = get("content");
            let preview: String = if content.chars().count() > CONTENT_PREVIEW_CHARS {
                let cut: String = content.chars().take(CONTENT_PREVIEW_CHARS).collect();
                format!("{}...", cut)
            } else {
                content.to_string()
            };
            format!(
                "File: {}\n\nExplanation:\n{}\n\nContent Preview:\n{}",
                get("filepath"),
                get("explanation"),
                preview
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted approver for tests.
    pub struct ScriptedApprover {
        pub choices: VecDeque<ApprovalChoice>,
        pub values: VecDeque<Option<String>>,
        pub confirms: VecDeque<bool>,
    }

    impl ScriptedApprover {
        fn new() -> Self {
            Self {
                choices: VecDeque::new(),
                values: VecDeque::new(),
                confirms: VecDeque::new(),
            }
        }
    }

    impl Approver for ScriptedApprover {
        fn choose(&mut self) -> ApprovalChoice {
            self.choices.pop_front().unwrap_or(ApprovalChoice::Skip)
        }

        fn prompt_value(&mut self, _label: &str, default: &str) -> Option<String> {
            self.values
                .pop_front()
                .unwrap_or_else(|| Some(default.to_string()))
        }

        fn confirm(&mut self, _question: &str, default: bool) -> bool {
            self.confirms.pop_front().unwrap_or(default)
        }
    }

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_auto_approve_shell_command() {
        let mut executor = ToolExecutor::new(Box::new(ScriptedApprover::new()));
        let (success, result) = executor
            .execute_with_approval(
                ToolName::ExecuteShellCommand,
                &args(&[("command", "echo hi"), ("explanation", "greeting")]),
                true,
            )
            .await;

        assert!(success);
        assert_eq!(
            result.as_deref(),
            Some("Exit code: 0\nStdout:\nhi\n\nStderr:\n")
        );
        assert_eq!(executor.records().len(), 1);
        assert_eq!(executor.records()[0].outcome, Outcome::Success);
        assert_eq!(executor.records()[0].kind, ActionKind::ShellCommand);
    }

    #[tokio::test]
    async fn test_failing_command_result_still_populated() {
        let mut executor = ToolExecutor::new(Box::new(ScriptedApprover::new()));
        let (success, result) = executor
            .execute_with_approval(
                ToolName::ExecuteShellCommand,
                &args(&[("command", "sh -c 'exit 3'"), ("explanation", "fails")]),
                true,
            )
            .await;

        assert!(!success);
        let text = result.unwrap();
        assert!(text.starts_with("Exit code: 3"));
        assert_eq!(executor.records()[0].outcome, Outcome::Failure);
    }

    #[tokio::test]
    async fn test_skip_does_not_execute() {
        let mut approver = ScriptedApprover::new();
        approver.choices.push_back(ApprovalChoice::Skip);
        let mut executor = ToolExecutor::new(Box::new(approver));

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("never.txt");
        let (success, result) = executor
            .execute_with_approval(
                ToolName::WriteFile,
                &args(&[
                    ("filepath", target.to_str().unwrap()),
                    ("content", "data"),
                    ("explanation", "test"),
                ]),
                false,
            )
            .await;

        assert!(!success);
        assert_eq!(result.as_deref(), Some("Skipped by user"));
        assert!(!target.exists());
        assert_eq!(executor.records()[0].outcome, Outcome::Skipped);
    }

    #[tokio::test]
    async fn test_modify_replaces_command() {
        let mut approver = ScriptedApprover::new();
        approver.choices.push_back(ApprovalChoice::Modify);
        approver.values.push_back(Some("echo changed".to_string()));
        let mut executor = ToolExecutor::new(Box::new(approver));

        let (success, result) = executor
            .execute_with_approval(
                ToolName::ExecuteShellCommand,
                &args(&[("command", "echo original"), ("explanation", "x")]),
                false,
            )
            .await;

        assert!(success);
        assert!(result.unwrap().contains("changed"));
    }

    #[tokio::test]
    async fn test_modify_cancelled() {
        let mut approver = ScriptedApprover::new();
        approver.choices.push_back(ApprovalChoice::Modify);
        approver.values.push_back(None);
        let mut executor = ToolExecutor::new(Box::new(approver));

        let (success, result) = executor
            .execute_with_approval(
                ToolName::ExecuteShellCommand,
                &args(&[("command", "echo hi"), ("explanation", "x")]),
                false,
            )
            .await;

        assert!(!success);
        assert_eq!(result.as_deref(), Some("Modification cancelled"));
        assert_eq!(executor.records()[0].outcome, Outcome::UserCancelled);
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let mut executor = ToolExecutor::new(Box::new(ScriptedApprover::new()));
        let (success, result) = executor
            .execute_with_approval(
                ToolName::ReadFile,
                &args(&[("filepath", "/tmp/termagent_missing_file_42.txt"), ("reason", "r")]),
                true,
            )
            .await;

        assert!(!success);
        assert_eq!(
            result.as_deref(),
            Some("File not found: /tmp/termagent_missing_file_42.txt")
        );
    }

    #[tokio::test]
    async fn test_read_existing_file_returns_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello world\n").unwrap();

        let mut executor = ToolExecutor::new(Box::new(ScriptedApprover::new()));
        let (success, result) = executor
            .execute_with_approval(
                ToolName::ReadFile,
                &args(&[("filepath", path.to_str().unwrap()), ("reason", "r")]),
                true,
            )
            .await;

        assert!(success);
        assert_eq!(result.as_deref(), Some("hello world\n"));
    }

    #[tokio::test]
    async fn test_write_new_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/out.txt");

        let mut executor = ToolExecutor::new(Box::new(ScriptedApprover::new()));
        let (success, result) = executor
            .execute_with_approval(
                ToolName::WriteFile,
                &args(&[
                    ("filepath", path.to_str().unwrap()),
                    ("content", "payload"),
                    ("explanation", "new file"),
                ]),
                true,
            )
            .await;

        assert!(success);
        assert!(result.unwrap().starts_with("Created "));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_write_overwrite_declined_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.txt");
        std::fs::write(&path, "original").unwrap();

        // Default confirm answer is decline.
        let mut executor = ToolExecutor::new(Box::new(ScriptedApprover::new()));
        let (success, result) = executor
            .execute_with_approval(
                ToolName::WriteFile,
                &args(&[
                    ("filepath", path.to_str().unwrap()),
                    ("content", "replacement"),
                    ("explanation", "overwrite"),
                ]),
                true,
            )
            .await;

        assert!(!success);
        assert_eq!(result.as_deref(), Some("User cancelled overwrite"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
        assert_eq!(executor.records()[0].outcome, Outcome::UserCancelled);
    }

    #[tokio::test]
    async fn test_write_overwrite_accepted_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.txt");
        std::fs::write(&path, "old").unwrap();

        let mut approver = ScriptedApprover::new();
        approver.confirms.push_back(true);
        let mut executor = ToolExecutor::new(Box::new(approver));

        let (success, result) = executor
            .execute_with_approval(
                ToolName::WriteFile,
                &args(&[
                    ("filepath", path.to_str().unwrap()),
                    ("content", "new"),
                    ("explanation", "update"),
                ]),
                true,
            )
            .await;

        assert!(success);
        assert!(result.unwrap().starts_with("Updated "));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_preview_truncates_content() {
        let long_content = "x".repeat(400);
        let preview = format_tool_preview(
            ToolName::WriteFile,
            &args(&[
                ("filepath", "a.txt"),
                ("content", &long_content),
                ("explanation", "big"),
            ]),
        );
        assert!(preview.contains("..."));
        assert!(!preview.contains(&long_content));
    }
}
