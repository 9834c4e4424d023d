//! stockmeta CLI - stock-photo metadata from any AI backend.
//!
//! Generates titles, descriptions, keywords, photobank categories and an
//! editorial flag for images, using cloud vision APIs, a local Ollama server
//! or an ONNX classifier selected with a `provider/model` string.
//!
//! # Usage
//!
//! ```bash
//! # Generate metadata for a directory
//! stockmeta generate ./photos --model openai/gpt-4o --output metadata.json
//!
//! # Ask a one-off question about an image
//! stockmeta ask "What is in this photo?" --image lake.jpg --model ollama/llava:7b
//!
//! # Submit titles as a provider batch job
//! stockmeta batch submit ./photos --model anthropic/claude-sonnet-4-20250514
//!
//! # View configuration
//! stockmeta config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// stockmeta - stock-photo metadata from any AI backend.
#[derive(Parser, Debug)]
#[command(name = "stockmeta")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "STOCKMETA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate stock metadata for images
    Generate(cli::generate::GenerateArgs),

    /// Send a single prompt (optionally with an image) to a model
    Ask(cli::ask::AskArgs),

    /// Submit, poll and cancel provider batch jobs
    Batch(cli::batch::BatchArgs),

    /// List known models per provider
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) if cli.config.is_some() => return Err(e),
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e:#}\n  \
                 Using default configuration. Check your config file with `stockmeta config path`."
            );
            stockmeta_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("stockmeta v{}", stockmeta_core::VERSION);

    match cli.command {
        Commands::Generate(args) => cli::generate::execute(args, &config).await,
        Commands::Ask(args) => cli::ask::execute(args, &config).await,
        Commands::Batch(args) => cli::batch::execute(args, &config).await,
        Commands::Models(args) => cli::models::execute(args, &config),
        Commands::Config(args) => cli::config::execute(args, &config, cli.config.as_deref()),
    }
}
