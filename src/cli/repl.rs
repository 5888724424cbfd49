//! Interactive REPL for Careline
//!
//! Provides the main user interaction loop.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tokio_stream::StreamExt;
use tracing::warn;

use crate::agent::{ChatEvent, ChatGraph, FileSessionStore, SystemContext};
use crate::cli::commands::{handle_command, CommandResult};
use crate::core::{Config, Result};
use crate::llm::OllamaClient;
use crate::tools::ToolRegistry;

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    config: Config,
    client: Arc<OllamaClient>,
    graph: Arc<ChatGraph>,
    session_id: String,
}

impl Repl {
    /// Create a REPL with custom configuration
    pub fn with_config(config: Config, session_id: impl Into<String>) -> Result<Self> {
        let client = Arc::new(OllamaClient::from_config(&config)?);
        let graph = ChatGraph::new(
            &config,
            client.clone(),
            Arc::new(ToolRegistry::with_defaults(&config)?),
            Arc::new(FileSessionStore::new(config.session.directory.clone())),
            Arc::new(SystemContext::from_config(&config)),
        );

        Ok(Self {
            config,
            client,
            graph: Arc::new(graph),
            session_id: session_id.into(),
        })
    }

    /// Run the REPL
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        print!("Checking models...");
        io::stdout().flush()?;

        match self.client.check_models().await {
            Ok(()) => println!(" Ready!\n"),
            Err(e) => {
                println!("\n\nInitialization Error: {}\n", e);
                println!(
                    "Make sure Ollama is running at {} and the models are pulled:\n  ollama pull {}\n  ollama pull {}",
                    self.config.ollama_url(),
                    self.config.models.chat,
                    self.config.models.summary
                );
                return Ok(());
            }
        }

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("You [{}]: ", self.session_id);
            stdout.flush()?;

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF (Ctrl+D)
                    println!("\nGoodbye!");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    continue;
                }
            }

            let input = input.trim();

            if input.is_empty() {
                continue;
            }

            match handle_command(input, &self.session_id, &self.graph, &self.config).await {
                Ok(CommandResult::Exit) => {
                    println!("\nGoodbye!");
                    break;
                }
                Ok(CommandResult::SwitchSession(id)) => {
                    println!("Switched to session {}\n", id);
                    self.session_id = id;
                }
                Ok(CommandResult::Handled(output)) => {
                    println!("{}\n", output);
                }
                Ok(CommandResult::Continue(input)) => {
                    self.answer(&input).await?;
                }
                Err(e) => {
                    eprintln!("Command error: {}\n", e);
                }
            }
        }

        Ok(())
    }

    /// Stream one answer to stdout; Ctrl+C abandons it
    async fn answer(&self, input: &str) -> Result<()> {
        let mut stream = self.graph.stream_turn(self.session_id.clone(), input);
        let mut stdout = io::stdout();

        print!("\nAssistant: ");
        stdout.flush()?;

        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(ChatEvent::Token(fragment)) => {
                        print!("{}", fragment);
                        stdout.flush()?;
                    }
                    Some(ChatEvent::Done) => {
                        println!("\n");
                        break;
                    }
                    Some(ChatEvent::Error(message)) => {
                        eprintln!("\nError: {}\n", message);
                        break;
                    }
                    None => {
                        warn!("turn ended without a final event");
                        println!();
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    // Dropping the stream cancels the turn; nothing is saved
                    println!("\n[cancelled]\n");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Print the startup banner
    fn print_banner(&self) {
        println!(
            r#"
╔═══════════════════════════════════════════╗
║                                           ║
║   Careline                                ║
║   Healthcare assistant                    ║
║                                           ║
╚═══════════════════════════════════════════╝
"#
        );
        println!("Ollama:     {}", self.config.ollama_url());
        println!("Models:");
        println!("  Chat:       {}", self.config.models.chat);
        println!("  Summarizer: {}", self.config.models.summary);
        println!("Sessions:   {}", self.config.session.directory.display());
        println!();
        println!("Commands: help, status, session, new, summary, tools, exit");
        println!("─────────────────────────────────────────────");
    }
}
