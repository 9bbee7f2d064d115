//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{IpcConfig, DEFAULT_MAX_CHUNK_SIZE};

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    location: String,
    default_timeout_ms: u64,
    max_chunk_size: usize,
    queue_enabled: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    location: config.identity.location.clone(),
                    default_timeout_ms: config.rpc.default_timeout_ms,
                    max_chunk_size: config.sink.effective_chunk_size(),
                    queue_enabled: config.queue.enabled,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &IpcConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sink.max_chunk_size > DEFAULT_MAX_CHUNK_SIZE {
        warnings.push(format!(
            "sink.max_chunk_size {} exceeds the maximum and is clamped to {}",
            config.sink.max_chunk_size, DEFAULT_MAX_CHUNK_SIZE
        ));
    }

    if config.sink.retry_max_attempts.is_none() {
        warnings.push(
            "sink.retry_max_attempts is unset - transient faults are retried forever".to_string(),
        );
    }

    if config.queue.enabled && config.queue.compaction_interval().is_none() {
        warnings.push(
            "queue.compaction_interval_ms is 0 - queue files only shrink when drained".to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Location: {}", summary.location);
            println!("  RPC timeout: {} ms", summary.default_timeout_ms);
            println!("  Chunk size: {} bytes", summary.max_chunk_size);
            println!("  Queue enabled: {}", summary.queue_enabled);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
