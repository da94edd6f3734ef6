//! Interactive chat loop.
//!
//! One turn: read input, stream the model response with Ctrl-C cancellation,
//! then walk the response for command candidates (Linux persona only) and
//! JSON tool invocations, routing both through the approval gate. The outer
//! loop never crashes on a failed turn.

pub mod input;

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::executor::{StdinApprover, ToolExecutor};
use crate::personas::{Persona, Verbosity, ALL_PERSONAS};
use crate::protocol::{extract, CommandCandidate, ToolInvocation, ToolName};
use crate::protocol::extract::DEFAULT_MAX_RESULTS;
use crate::providers::ModelBackend;
use crate::session::{ChatEvent, ChatSession, SessionConfig};
use crate::syntax;
use crate::tui;

/// Timeout for the `!command` fast path. Tool-mediated execution is
/// deliberately unbounded; this path has no approval step, so it is bounded
/// instead.
const DIRECT_SHELL_TIMEOUT: Duration = Duration::from_secs(30);

enum Dispatch {
    Continue,
    Exit,
}

pub struct Repl {
    session: ChatSession,
    executor: ToolExecutor,
    editor: DefaultEditor,
    auto_approve: bool,
}

impl Repl {
    pub fn new(backend: Arc<dyn ModelBackend>, config: SessionConfig) -> Result<Self> {
        Ok(Self {
            session: ChatSession::new(backend, config),
            executor: ToolExecutor::new(Box::new(StdinApprover)),
            editor: DefaultEditor::new()?,
            auto_approve: false,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            println!();
            let line = match self.editor.readline(&format!(
                "{}You{} > ",
                tui::GREEN,
                tui::RESET
            )) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    println!("{}", tui::warn("Use !quit to exit"));
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", tui::warn("Goodbye! (Ctrl+D)"));
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            let Some(expanded) = self.expand_input(&line) else {
                continue;
            };
            let _ = self.editor.add_history_entry(&line);

            if expanded.starts_with('!') {
                match self.dispatch_command(&expanded).await {
                    Ok(Dispatch::Exit) => break,
                    Ok(Dispatch::Continue) => continue,
                    Err(e) => {
                        warn!("command dispatch failed: {:#}", e);
                        println!("{}", tui::err(&format!("{}", e)));
                        continue;
                    }
                }
            }

            if let Err(e) = self.run_turn(&expanded).await {
                warn!("turn failed: {:#}", e);
                println!("{}", tui::err(&format!("Error during response: {}", e)));
            }
        }

        Ok(())
    }

    /// Apply multi-line capture and `@file` expansion. Returns `None` for
    /// blank input.
    fn expand_input(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }

        let text = if let Some(delimiter) = input::multiline_delimiter(line) {
            println!("{}Multi-line mode (end with {})...{}", tui::DIM, delimiter, tui::RESET);
            let editor = &mut self.editor;
            let mut read = || editor.readline("... ").ok();
            let collected = input::collect_delimited(line, delimiter, &mut read);
            if collected.trim().is_empty() {
                return None;
            }
            collected
        } else {
            line.to_string()
        };

        // Direct commands are passed through untouched.
        if text.starts_with('!') {
            return Some(text);
        }

        let processed = input::process_file_references(&text);
        if processed.trim().is_empty() {
            None
        } else {
            Some(processed)
        }
    }

    async fn dispatch_command(&mut self, command: &str) -> Result<Dispatch> {
        let trimmed = command.trim();
        let lower = trimmed.to_lowercase();
        let mut parts = lower.split_whitespace();
        let head = parts.next().unwrap_or("");

        match head {
            "!quit" | "!exit" | "!q" => {
                println!("{}", tui::warn("Goodbye!"));
                return Ok(Dispatch::Exit);
            }
            "!clear" => {
                self.session.clear_history();
                println!("{}", tui::ok("Conversation history cleared"));
            }
            "!status" => self.print_status(),
            "!help" => self.print_help(),
            "!mode" => match parts.next().and_then(Verbosity::from_name) {
                Some(verbosity) => {
                    self.session.set_verbosity(verbosity);
                    println!("{}", tui::ok(&format!("Response mode: {}", verbosity.id())));
                }
                None => {
                    println!("Current mode: {}", self.session.verbosity().id());
                    println!("Usage: !mode quick|full");
                }
            },
            "!expert" => match parts.next().and_then(Persona::from_name) {
                Some(persona) => {
                    self.session.set_persona(persona);
                    println!("{}", tui::ok(&format!("Expert mode: {}", persona.name())));
                    println!("{}", tui::warn("Conversation history cleared"));
                }
                None => {
                    println!("Current expert: {}", self.session.persona().id());
                    let ids: Vec<&str> = ALL_PERSONAS.iter().map(|p| p.id()).collect();
                    println!("Available: {}", ids.join(", "));
                }
            },
            "!auto-approve" => match parts.next() {
                Some("on") => {
                    self.auto_approve = true;
                    println!("{}", tui::ok("Auto-approve enabled (commands execute automatically)"));
                }
                Some("off") => {
                    self.auto_approve = false;
                    println!("{}", tui::warn("Auto-approve disabled (manual approval required)"));
                }
                _ => {
                    let state = if self.auto_approve { "enabled" } else { "disabled" };
                    println!("Auto-approve is currently: {}", state);
                    println!("Usage: !auto-approve on|off");
                }
            },
            "!multiline" => {
                let editor = &mut self.editor;
                let mut read = || editor.readline("... ").ok();
                if let Some(text) = input::collect_until_eof(&mut read) {
                    let expanded = input::process_file_references(&text);
                    if !expanded.trim().is_empty() {
                        self.run_turn(&expanded).await?;
                    }
                }
            }
            _ => self.run_direct_shell(&trimmed[1..]).await,
        }

        Ok(Dispatch::Continue)
    }

    /// Fast path for `!ls`-style commands: no approval, bounded runtime.
    async fn run_direct_shell(&self, command: &str) {
        let command = command.trim();
        if command.is_empty() {
            println!("{}", tui::err("Empty command"));
            return;
        }
        println!("{}$ {}{}", tui::DIM, command, tui::RESET);

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output();
        match tokio::time::timeout(DIRECT_SHELL_TIMEOUT, child).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stdout.trim_end().is_empty() {
                    println!("{}", stdout.trim_end());
                }
                if !stderr.trim_end().is_empty() {
                    println!("{}", tui::err(stderr.trim_end()));
                }
            }
            Ok(Err(e)) => println!("{}", tui::err(&format!("Error: {}", e))),
            Err(_) => println!("{}", tui::err("Command timed out (30s limit)")),
        }
    }

    /// One full conversational turn.
    async fn run_turn(&mut self, user_input: &str) -> Result<()> {
        self.session.add_user_message(user_input);
        print!("\n{}Agent{}: ", tui::CYAN, tui::RESET);
        std::io::stdout().flush().ok();

        let cancel = CancellationToken::new();
        let mut rx = self.session.stream_turn(cancel.clone()).await?;

        let mut response_text = String::new();
        let mut tool_calls: Vec<ToolInvocation> = Vec::new();
        let mut cancelled = false;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                    cancel.cancel();
                }
                event = rx.recv() => match event {
                    None => break,
                    Some(ChatEvent::Text(text)) => {
                        print!("{}", text);
                        std::io::stdout().flush().ok();
                        response_text.push_str(&text);
                    }
                    Some(ChatEvent::ToolCall(call)) => tool_calls.push(call),
                    Some(ChatEvent::Cancelled) => {
                        cancelled = true;
                        break;
                    }
                },
            }
        }
        println!();

        if cancelled {
            println!("\n{}", tui::warn("Response interrupted!"));
            // No orphaned user turn in history.
            self.session.rollback_user_message();
            return Ok(());
        }

        self.session.add_assistant_message(&response_text);

        // Command suggestions are a Linux-persona feature only; other
        // personas answer in languages where backtick spans are rarely
        // shell commands.
        if self.session.persona() == Persona::Linux {
            let candidates = extract(&response_text, DEFAULT_MAX_RESULTS);
            if !candidates.is_empty() {
                self.handle_command_suggestions(&candidates).await;
            }
        }

        if !tool_calls.is_empty() {
            self.handle_tool_calls(tool_calls).await?;
        }

        Ok(())
    }

    /// Numbered candidate menu: a digit executes, `0` or empty skips, `m`
    /// prompts for a replacement command.
    async fn handle_command_suggestions(&mut self, candidates: &[CommandCandidate]) {
        println!("{}", format_command_menu(candidates));

        let choice = match self.editor.readline("Select command [0]: ") {
            Ok(line) => {
                let trimmed = line.trim().to_string();
                if trimmed.is_empty() {
                    "0".to_string()
                } else {
                    trimmed
                }
            }
            Err(_) => {
                println!("{}", tui::warn("Skipped command execution"));
                return;
            }
        };

        if let Ok(number) = choice.parse::<usize>() {
            if number == 0 {
                println!("{}Skipped command execution{}", tui::DIM, tui::RESET);
                return;
            }
            let Some(selected) = candidates.get(number - 1) else {
                println!("{}", tui::err("Invalid choice"));
                return;
            };

            let mut arguments = HashMap::new();
            arguments.insert("command".to_string(), selected.text.clone());
            arguments.insert(
                "explanation".to_string(),
                selected
                    .explanation
                    .clone()
                    .unwrap_or_else(|| "Suggested command".to_string()),
            );
            let (success, result) = self
                .executor
                .execute_with_approval(ToolName::ExecuteShellCommand, &arguments, self.auto_approve)
                .await;

            if success {
                self.session.add_tool_result(
                    &format!("cmd_{}", number),
                    ToolName::ExecuteShellCommand.as_wire(),
                    result.as_deref().unwrap_or("Command executed successfully"),
                );
            }
            return;
        }

        if choice.eq_ignore_ascii_case("m") {
            let Ok(modified) = self.editor.readline("Enter command: ") else {
                return;
            };
            let modified = modified.trim();
            if modified.is_empty() {
                return;
            }
            let mut arguments = HashMap::new();
            arguments.insert("command".to_string(), modified.to_string());
            arguments.insert("explanation".to_string(), "Modified command".to_string());
            // Modified commands always go through approval.
            let _ = self
                .executor
                .execute_with_approval(ToolName::ExecuteShellCommand, &arguments, false)
                .await;
            return;
        }

        println!(
            "{}",
            tui::err("Invalid input. Enter a number, 'm' to modify, or 0 to skip")
        );
    }

    /// Route decoded tool invocations through the approval gate; a
    /// successful execution triggers one follow-up turn so the model can
    /// comment on the result.
    async fn handle_tool_calls(&mut self, tool_calls: Vec<ToolInvocation>) -> Result<()> {
        for call in tool_calls {
            debug!("tool call {}: {}", call.id, call.name.as_wire());
            let (success, result) = self
                .executor
                .execute_with_approval(call.name, &call.arguments, self.auto_approve)
                .await;

            let result_text = result.unwrap_or_else(|| {
                if success {
                    "Success".to_string()
                } else {
                    "Failed".to_string()
                }
            });
            self.session
                .add_tool_result(&call.id, call.name.as_wire(), &result_text);

            if success {
                print!("\n{}Agent{}: ", tui::CYAN, tui::RESET);
                std::io::stdout().flush().ok();
                let follow_up = self.session.complete_turn().await?;
                print!("{}", syntax::render_response(&follow_up));
                println!();
                self.session.add_assistant_message(&follow_up);
            }
        }
        Ok(())
    }

    fn print_welcome(&self) {
        let backend = self.session.backend();
        let body = format!(
            "Configuration:\n\
             - Server: {}\n\
             - Model: {}\n\
             - Expert: {}\n\
             - Response: {}\n\
             \n\
             Special Commands:\n\
             - !mode quick|full - Switch response mode\n\
             - !expert linux|python|devops|database|general - Switch expert\n\
             - !auto-approve on|off - Toggle automatic approval\n\
             - !status - Show current configuration\n\
             - !clear - Clear conversation history\n\
             - !multiline - Enter multi-line input mode\n\
             - !help - Show help\n\
             - !quit, !exit, !q - Exit\n\
             \n\
             Input Features:\n\
             - Quick multi-line: ''' or ``` or \"\"\"\n\
             - File ingestion: @filename.txt\n\
             - Shell commands: !ls, !pwd, !git status\n\
             - Interrupt: Ctrl+C during response\n\
             \n\
             Note: command suggestions only in Linux expert mode",
            backend.base_url(),
            backend.model(),
            self.session.persona().name(),
            self.session.verbosity().id(),
        );
        println!("{}", tui::panel("Terminal Agent", &body));
    }

    fn print_status(&self) {
        let backend = self.session.backend();
        let body = format!(
            "Expert Mode: {}\n\
             Response Mode: {}\n\
             Temperature: {}\n\
             Max Tokens: {}\n\
             Auto-approve: {}\n\
             Server: {}\n\
             Model: {}\n\
             Messages in history: {}",
            self.session.persona().name(),
            self.session.verbosity().id(),
            self.session.temperature(),
            self.session.max_tokens(),
            if self.auto_approve { "on" } else { "off" },
            backend.base_url(),
            backend.model(),
            self.session.history().len(),
        );
        println!("{}", tui::panel("Status", &body));
    }

    fn print_help(&self) {
        let body = "Special commands start with '!':\n\
             \n\
             !quit, !exit, !q       Exit\n\
             !clear                 Clear conversation history\n\
             !status                Show current configuration\n\
             !mode quick|full       Switch response mode\n\
             !expert <name>         Switch expert (linux, python, devops, database, general)\n\
             !auto-approve on|off   Toggle automatic command approval\n\
             !multiline             Multi-line input, finish with Ctrl+D\n\
             !<command>             Run a shell command directly (30s limit)\n\
             \n\
             Multi-line quick mode: start a line with ''' or \"\"\" or ```\n\
             File ingestion: @file.txt, @~/notes.md, @/abs/path.rs\n\
             Ctrl+C during a response interrupts it; at the prompt it reminds\n\
             you to use !quit.";
        println!("{}", tui::panel("Help", body));
    }
}

/// Render the numbered candidate menu.
pub fn format_command_menu(candidates: &[CommandCandidate]) -> String {
    let mut out = format!("\n{}Suggested commands:{}\n\n", tui::BOLD, tui::RESET);
    for (i, candidate) in candidates.iter().enumerate() {
        out.push_str(&format!(
            "{}{}.{} {}{}{}\n",
            tui::CYAN,
            i + 1,
            tui::RESET,
            tui::GREEN,
            candidate.text,
            tui::RESET
        ));
        if let Some(ref explanation) = candidate.explanation {
            out.push_str(&format!("   {}-> {}{}\n", tui::DIM, explanation, tui::RESET));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "{}0.{} Do nothing\n   {}-> Skip execution{}\n",
        tui::CYAN,
        tui::RESET,
        tui::DIM,
        tui::RESET
    ));
    out
}
