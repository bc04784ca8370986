//! Siphon - partitioned event ingestion to Elasticsearch and OpenSchema
//!
//! # Usage
//!
//! ```bash
//! # Validate a configuration file
//! siphon check-config --config configs/siphon.toml
//!
//! # Replay an NDJSON event file through the pipelines
//! siphon replay --config configs/siphon.toml --events events.ndjson
//! siphon replay --config configs/siphon.toml --events events.ndjson --pipeline elasticsearch
//! ```

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Siphon - partitioned event ingestion engine
#[derive(Parser, Debug)]
#[command(name = "siphon")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay an NDJSON event file through the pipelines
    Replay(cmd::replay::ReplayArgs),

    /// Load and validate a configuration file
    CheckConfig(cmd::check::CheckArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Command::Replay(args) => cmd::replay::run(args).await,
        Command::CheckConfig(args) => cmd::check::run(args),
    }
}

/// Initialize tracing with an env-filter; RUST_LOG overrides the flag
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    Ok(())
}
