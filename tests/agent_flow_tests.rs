// End-to-end flow: model response -> session events -> candidate extraction
// and tool execution through the approval gate.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use termagent::executor::{ApprovalChoice, Approver, Outcome, ToolExecutor};
use termagent::personas::{Persona, Verbosity};
use termagent::protocol::{decode, extract, CandidateOrigin, ToolName};
use termagent::providers::{ModelBackend, StreamChunk, StreamHandle};
use termagent::repl::format_command_menu;
use termagent::session::{ChatEvent, ChatSession, Role, SessionConfig};

/// Backend that replays a fixed response as a stream of fragments.
struct ScriptedBackend {
    fragments: Vec<String>,
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn chat(
        &self,
        _messages: &[serde_json::Value],
        _temperature: f64,
        _max_tokens: u32,
    ) -> Result<String> {
        Ok(self.fragments.concat())
    }

    async fn chat_stream(
        &self,
        _messages: &[serde_json::Value],
        _temperature: f64,
        _max_tokens: u32,
        _cancel: CancellationToken,
    ) -> Result<StreamHandle> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        for fragment in &self.fragments {
            let _ = tx.send(StreamChunk::Delta(fragment.clone()));
        }
        let _ = tx.send(StreamChunk::Done);
        Ok(StreamHandle { rx })
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn base_url(&self) -> &str {
        "http://localhost:0"
    }
}

/// Approver that always executes.
struct AlwaysExecute;

impl Approver for AlwaysExecute {
    fn choose(&mut self) -> ApprovalChoice {
        ApprovalChoice::Execute
    }

    fn prompt_value(&mut self, _label: &str, default: &str) -> Option<String> {
        Some(default.to_string())
    }

    fn confirm(&mut self, _question: &str, default: bool) -> bool {
        default
    }
}

fn session(fragments: &[&str]) -> ChatSession {
    let backend = Arc::new(ScriptedBackend {
        fragments: fragments.iter().map(|s| s.to_string()).collect(),
    });
    ChatSession::new(
        backend,
        SessionConfig {
            persona: Persona::Linux,
            verbosity: Verbosity::Quick,
            temperature: None,
            max_tokens: None,
        },
    )
}

async fn run_turn(session: &mut ChatSession, input: &str) -> (String, Vec<ChatEvent>) {
    session.add_user_message(input);
    let mut rx = session.stream_turn(CancellationToken::new()).await.unwrap();
    let mut text = String::new();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        if let ChatEvent::Text(ref t) = event {
            text.push_str(t);
        }
        events.push(event);
    }
    (text, events)
}

#[tokio::test]
async fn tool_call_flows_from_stream_to_executor_to_history() {
    let response = "I'll run it:\n```json\n{\"tool\":\"execute_shell_command\",\"arguments\":{\"command\":\"echo hi\",\"explanation\":\"greeting\"}}\n```";
    // Split mid-block so the invocation only decodes from the full text.
    let (a, b) = response.split_at(40);
    let mut session = session(&[a, b]);

    let (text, events) = run_turn(&mut session, "say hi via the shell").await;
    session.add_assistant_message(&text);

    let calls: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::ToolCall(c) => Some(c.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, ToolName::ExecuteShellCommand);

    let mut executor = ToolExecutor::new(Box::new(AlwaysExecute));
    let (success, result) = executor
        .execute_with_approval(calls[0].name, &calls[0].arguments, false)
        .await;
    assert!(success);
    let result = result.unwrap();
    assert_eq!(result, "Exit code: 0\nStdout:\nhi\n\nStderr:\n");
    assert_eq!(executor.records().len(), 1);
    assert_eq!(executor.records()[0].outcome, Outcome::Success);

    session.add_tool_result(&calls[0].id, calls[0].name.as_wire(), &result);
    let last = session.history().last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("call_0"));
}

#[tokio::test]
async fn linux_candidates_extracted_from_completed_response() {
    let response =
        "Use `df -h` to check disk space.\n\n```bash\ndu -sh /var/log\n```\nThat sums the logs.";
    let mut session = session(&[response]);
    let (text, _) = run_turn(&mut session, "how full is my disk?").await;

    let candidates = extract(&text, 3);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].text, "du -sh /var/log");
    assert_eq!(candidates[0].origin, CandidateOrigin::FencedBlock);
    assert_eq!(candidates[1].text, "df -h");

    let menu = format_command_menu(&candidates);
    assert!(menu.contains("1."));
    assert!(menu.contains("du -sh /var/log"));
    assert!(menu.contains("0."));
}

#[tokio::test]
async fn declined_overwrite_keeps_file_and_reports_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.txt");
    std::fs::write(&path, "keep me").unwrap();

    let mut arguments = HashMap::new();
    arguments.insert("filepath".to_string(), path.display().to_string());
    arguments.insert("content".to_string(), "overwrite attempt".to_string());
    arguments.insert("explanation".to_string(), "test".to_string());

    // AlwaysExecute answers confirmations with the default, which declines.
    let mut executor = ToolExecutor::new(Box::new(AlwaysExecute));
    let (success, result) = executor
        .execute_with_approval(ToolName::WriteFile, &arguments, true)
        .await;

    assert!(!success);
    assert_eq!(result.as_deref(), Some("User cancelled overwrite"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    assert_eq!(executor.records()[0].outcome, Outcome::UserCancelled);
}

#[tokio::test]
async fn malformed_tool_block_is_ignored_but_turn_survives() {
    let response = "```json\n{\"tool\": \"launch_missiles\", \"arguments\": {}}\n```\nNothing to do.";
    let mut session = session(&[response]);
    let (text, events) = run_turn(&mut session, "do something weird").await;

    assert!(text.contains("Nothing to do."));
    assert!(decode(&text).is_empty());
    assert!(!events.iter().any(|e| matches!(e, ChatEvent::ToolCall(_))));
}

#[tokio::test]
async fn cancellation_rolls_back_user_turn() {
    let mut session = session(&["partial answer"]);
    session.add_user_message("question");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut rx = session.stream_turn(cancel).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events, vec![ChatEvent::Cancelled]);

    session.rollback_user_message();
    assert!(!session.history().iter().any(|m| m.role == Role::User));
}
