//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// IPC Relay - RPC gateway, sink dispatcher and durable queue tooling
#[derive(Parser, Debug)]
#[command(
    name = "ipc-relay",
    author,
    version,
    about = "IPC dispatch layer tooling",
    long_about = "Operator tooling for the IPC dispatch layer.\n\n\
                  Runs RPC echo checks against an in-process broker, inspects and \n\
                  repairs durable queue files, and validates configuration."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "IPC_RELAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "IPC_RELAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Round-trip echo requests through an in-process broker
    Echo(EchoArgs),

    /// Operate on durable queue files
    Queue(QueueArgs),

    /// Validate configuration file
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `echo` command
#[derive(Parser, Debug, Clone)]
pub struct EchoArgs {
    /// Path to configuration file (defaults apply when absent)
    #[arg(short, long, env = "IPC_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Message to echo
    #[arg(short, long, default_value = "HELLO!")]
    pub message: String,

    /// Number of requests
    #[arg(short = 'n', long, default_value = "10", env = "IPC_RELAY_ECHO_COUNT")]
    pub count: u64,

    /// Requests in flight at once
    #[arg(long, default_value = "4")]
    pub concurrency: usize,

    /// Location the echo module listens on
    #[arg(long, default_value = "Remote")]
    pub location: String,

    /// System id the echo module is bound to
    #[arg(long)]
    pub system_id: Option<String>,

    /// Address requests to this system id instead
    #[arg(long)]
    pub target_system_id: Option<String>,

    /// Per-request time to live in milliseconds (0 = default timeout)
    #[arg(long, default_value = "0")]
    pub ttl_ms: u64,

    /// Delay the echo module adds before answering
    #[arg(long, default_value = "0")]
    pub delay_ms: u64,

    /// Make every request fail on the serving side
    #[arg(long)]
    pub fail: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "IPC_RELAY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `queue` command
#[derive(Args, Debug)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommand,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Print a read-only report of a queue file
    Inspect(QueueFileArgs),

    /// Exit with an error if the queue file would be repaired on open
    Verify(QueueFileArgs),

    /// Reclaim the consumed prefix of a queue
    Compact(QueueOpenArgs),

    /// Remove and print the entries of a queue
    Drain(DrainArgs),
}

#[derive(Args, Debug)]
pub struct QueueFileArgs {
    /// Path to a `.fifo` queue file
    pub path: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct QueueOpenArgs {
    /// Queue name (file `{base_dir}/{name}.fifo`)
    pub name: String,

    /// Directory holding the queue files (overrides configuration)
    #[arg(long, env = "IPC_RELAY_QUEUE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, env = "IPC_RELAY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DrainArgs {
    #[command(flatten)]
    pub queue: QueueOpenArgs,

    /// Stop after this many entries (0 = all)
    #[arg(long, default_value = "0")]
    pub limit: usize,

    /// Print entry values as UTF-8 text when possible
    #[arg(long)]
    pub text: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "ipc.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "ipc.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
