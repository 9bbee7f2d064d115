//! # IPC Relay CLI
//!
//! `ipc-relay echo` round-trips requests through an in-process broker and
//! prints latency stats. `ipc-relay queue` inspects, verifies, compacts and
//! drains `.fifo` spillover files. `validate` and `info` check a config file.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use observability::{LogFormat, ObservabilityConfig};
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_echo, run_info, run_queue, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on CLI options
    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "IPC Relay CLI starting");

    // Execute command
    let result = match &cli.command {
        Commands::Echo(args) => run_echo(args).await,
        Commands::Queue(args) => run_queue(args),
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    let format = match cli.log_format {
        cli::LogFormat::Json => LogFormat::Json,
        cli::LogFormat::Pretty => LogFormat::Pretty,
        cli::LogFormat::Compact => LogFormat::Compact,
    };
    observability::init_with_config(ObservabilityConfig::from_verbosity(
        cli.verbose,
        cli.quiet,
        format,
    ))
}
