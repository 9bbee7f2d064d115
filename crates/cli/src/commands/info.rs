//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{sink_destination, IpcConfig};

use super::load_config;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    identity: IdentityInfo,
    rpc: RpcInfo,
    sink: SinkInfo,
    queue: QueueInfo,
}

#[derive(Serialize)]
struct IdentityInfo {
    location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_id: Option<String>,
}

#[derive(Serialize)]
struct RpcInfo {
    default_timeout_ms: u64,
}

#[derive(Serialize)]
struct SinkInfo {
    max_chunk_size: usize,
    destination_prefix: String,
    example_destination: String,
    retry_initial_backoff_ms: u64,
    retry_max_backoff_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_max_attempts: Option<u32>,
}

#[derive(Serialize)]
struct QueueInfo {
    enabled: bool,
    base_dir: String,
    memory_capacity: usize,
    disk_capacity_bytes: u64,
    compaction_interval_ms: u64,
    workers: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let config = load_config(Some(&args.config))?;

    if args.json {
        let info = build_config_info(&config);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn build_config_info(config: &IpcConfig) -> ConfigInfo {
    ConfigInfo {
        version: format!("{:?}", config.version),
        identity: IdentityInfo {
            location: config.identity.location.clone(),
            system_id: config.identity.system_id.clone(),
        },
        rpc: RpcInfo {
            default_timeout_ms: config.rpc.default_timeout_ms,
        },
        sink: SinkInfo {
            max_chunk_size: config.sink.effective_chunk_size(),
            destination_prefix: config.sink.destination_prefix.clone(),
            example_destination: example_destination(config),
            retry_initial_backoff_ms: config.sink.retry_initial_backoff_ms,
            retry_max_backoff_ms: config.sink.retry_max_backoff_ms,
            retry_max_attempts: config.sink.retry_max_attempts,
        },
        queue: QueueInfo {
            enabled: config.queue.enabled,
            base_dir: config.queue.base_dir.display().to_string(),
            memory_capacity: config.queue.memory_capacity,
            disk_capacity_bytes: config.queue.disk_capacity_bytes,
            compaction_interval_ms: config.queue.compaction_interval_ms,
            workers: config.queue.workers,
        },
    }
}

/// Destination a module named `Events` would publish to
fn example_destination(config: &IpcConfig) -> String {
    sink_destination(&config.sink.destination_prefix, "Events")
}

fn print_config_info(config: &IpcConfig) {
    println!("\n=== IPC Configuration ===\n");
    println!("Identity:");
    println!("  Location: {}", config.identity.location);
    if let Some(ref system_id) = config.identity.system_id {
        println!("  System id: {}", system_id);
    }

    println!("\nRPC:");
    println!("  Default timeout: {} ms", config.rpc.default_timeout_ms);

    println!("\nSink:");
    println!("  Chunk size: {} bytes", config.sink.effective_chunk_size());
    println!("  Destination: {}", example_destination(config));
    println!(
        "  Retry backoff: {}..{} ms, attempts: {}",
        config.sink.retry_initial_backoff_ms,
        config.sink.retry_max_backoff_ms,
        config
            .sink
            .retry_max_attempts
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );

    println!("\nQueue:");
    if config.queue.enabled {
        println!("  Directory: {}", config.queue.base_dir.display());
        println!("  Memory capacity: {} entries", config.queue.memory_capacity);
        println!("  Disk capacity: {} bytes", config.queue.disk_capacity_bytes);
        println!("  Workers: {}", config.queue.workers);
    } else {
        println!("  Disabled");
    }

    println!();
}
