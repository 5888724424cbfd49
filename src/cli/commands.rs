//! CLI commands
//!
//! Special commands that can be executed in the REPL.

use crate::agent::ChatGraph;
use crate::core::{Config, Result};

/// Result of parsing a command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Continue processing as normal input
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Switched to another session
    SwitchSession(String),
    /// Exit the REPL
    Exit,
}

/// Fresh random session id
pub fn new_session_id() -> String {
    format!("session-{:08x}", rand::random::<u32>())
}

/// Parse and handle special commands
pub async fn handle_command(
    input: &str,
    session_id: &str,
    graph: &ChatGraph,
    config: &Config,
) -> Result<CommandResult> {
    let input = input.trim();
    let (cmd, args) = match input.split_once(' ') {
        Some((cmd, args)) => (cmd.to_lowercase(), args.trim()),
        None => (input.to_lowercase(), ""),
    };

    // Only `session <id>` takes an argument; "new pain in my chest" is chat
    let bare = args.is_empty();

    match cmd.as_str() {
        "exit" | "quit" | "q" if bare => Ok(CommandResult::Exit),

        "help" | "?" if bare => Ok(CommandResult::Handled(help_text())),

        "new" if bare => Ok(CommandResult::SwitchSession(new_session_id())),

        "session" if !args.contains(char::is_whitespace) => {
            if args.is_empty() {
                Ok(CommandResult::Handled(format!("Current session: {}", session_id)))
            } else {
                Ok(CommandResult::SwitchSession(args.to_string()))
            }
        }

        "summary" if bare => {
            let summary = graph
                .session(session_id)
                .await?
                .map(|state| state.summary)
                .unwrap_or_default();
            if summary.is_empty() {
                Ok(CommandResult::Handled("No summary yet.".to_string()))
            } else {
                Ok(CommandResult::Handled(format!("Summary:\n{}", summary)))
            }
        }

        "tools" if bare => {
            let names = graph
                .tool_names()
                .iter()
                .map(|name| format!("  - {}", name))
                .collect::<Vec<_>>()
                .join("\n");
            Ok(CommandResult::Handled(format!("Available tools:\n{}", names)))
        }

        "status" if bare => {
            let (history, summary_chars) = match graph.session(session_id).await? {
                Some(state) => (state.len(), state.summary.chars().count()),
                None => (0, 0),
            };
            let status = format!(
                "Careline Status:\n\
                 ─────────────────────────────\n\
                 Session:      {}\n\
                 Backend:      {}\n\
                 Chat model:   {}\n\
                 Summarizer:   {}\n\
                 History:      {} messages\n\
                 Memory:       {} chars\n\
                 Budget:       {} tokens",
                session_id,
                graph.gateway_name(),
                config.models.chat,
                config.models.summary,
                history,
                summary_chars,
                graph.policy().threshold(),
            );
            Ok(CommandResult::Handled(status))
        }

        _ => {
            // Not a command, treat as normal input
            if input.starts_with('/') {
                Ok(CommandResult::Handled(format!(
                    "Unknown command: {}. Type 'help' for available commands.",
                    cmd
                )))
            } else {
                Ok(CommandResult::Continue(input.to_string()))
            }
        }
    }
}

/// Generate help text
fn help_text() -> String {
    r#"Careline Commands:
─────────────────────────────────────────────
  help, ?          Show this help message
  exit, quit, q    Exit Careline
  status           Show the current session and models
  session [id]     Show or switch the current session
  new              Start a new session
  summary          Show the long term memory of this session
  tools            List the tools the assistant can use

Keyboard Shortcuts:
  Ctrl+C           Cancel the current answer
  Ctrl+D           Exit Careline
─────────────────────────────────────────────"#
        .to_string()
}
