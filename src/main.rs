//! Careline - Conversational healthcare assistant
//!
//! Main entry point for the CLI application.

use std::io::Write;

use careline::agent::ChatGraph;
use careline::{Config, Repl};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Careline - Conversational healthcare assistant
#[derive(Parser, Debug)]
#[command(name = "careline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat model (for answers and tool calling)
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Model used to summarize old history
    #[arg(long, short = 's')]
    summary_model: Option<String>,

    /// Session id; the user id the assistant books appointments for
    #[arg(long, default_value = "default")]
    session: String,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,

    /// Single prompt mode (non-interactive)
    #[arg(long, short = 'p')]
    prompt: Option<String>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", Config::default_config_toml());
        return Ok(());
    }

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(model) = args.model {
        config.models.chat = model;
    }

    if let Some(model) = args.summary_model {
        config.models.summary = model;
    }

    if args.debug {
        config.agent.debug = true;
    }

    init_tracing(config.agent.debug);

    // Single prompt mode
    if let Some(prompt) = args.prompt {
        let graph = ChatGraph::from_config(&config)?;
        let on_token: careline::llm::StreamCallback = Box::new(|fragment: &str| {
            print!("{}", fragment);
            let _ = std::io::stdout().flush();
        });

        graph.run_turn(&args.session, &prompt, Some(&on_token)).await?;
        println!();
        return Ok(());
    }

    // Interactive REPL mode
    let mut repl = Repl::with_config(config, args.session)?;
    repl.run().await?;

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over the debug flag
fn init_tracing(debug: bool) {
    let default_level = if debug { "careline=debug" } else { "careline=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
