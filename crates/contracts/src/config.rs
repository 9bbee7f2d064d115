//! IpcConfig - Config Loader output
//!
//! Configuration surface for the RPC gateway, the sink dispatcher and the
//! durable spillover queue.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Upper bound for a single sink chunk (bytes)
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 921_600;

/// Default RPC timeout when neither config nor request sets one
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 20_000;

/// Default location name of the controller
pub const DEFAULT_LOCATION: &str = "Default";

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete IPC configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct IpcConfig {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// Identity of this process
    #[serde(default)]
    #[validate(nested)]
    pub identity: IdentityConfig,

    /// Request gateway settings
    #[serde(default)]
    #[validate(nested)]
    pub rpc: RpcConfig,

    /// Sink dispatcher settings
    #[serde(default)]
    #[validate(nested)]
    pub sink: SinkConfig,

    /// Durable spillover queue settings
    #[serde(default)]
    #[validate(nested)]
    pub queue: QueueConfig,
}

/// Where this process runs
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IdentityConfig {
    /// Location name; requests addressed here execute locally
    #[serde(default = "default_location")]
    #[validate(length(min = 1))]
    pub location: String,

    /// System id of this process
    #[serde(default)]
    pub system_id: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            system_id: None,
        }
    }
}

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

/// Request gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RpcConfig {
    /// Default timeout in milliseconds, also the ceiling for request TTLs
    #[serde(default = "default_rpc_timeout_ms")]
    #[validate(range(min = 1))]
    pub default_timeout_ms: u64,
}

impl RpcConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

/// Sink dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Maximum chunk size in bytes (clamped to [`DEFAULT_MAX_CHUNK_SIZE`])
    #[serde(default = "default_max_chunk_size")]
    #[validate(range(min = 1))]
    pub max_chunk_size: usize,

    /// Prefix for destination names
    #[serde(default = "default_destination_prefix")]
    #[validate(length(min = 1))]
    pub destination_prefix: String,

    /// First backoff between transient-fault retries
    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,

    /// Attempts per chunk before giving up (None = retry forever)
    #[serde(default)]
    pub retry_max_attempts: Option<u32>,
}

impl SinkConfig {
    /// Configured chunk size bounded by the hard maximum
    pub fn effective_chunk_size(&self) -> usize {
        self.max_chunk_size.min(DEFAULT_MAX_CHUNK_SIZE)
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            destination_prefix: default_destination_prefix(),
            retry_initial_backoff_ms: default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
            retry_max_attempts: None,
        }
    }
}

fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}

fn default_destination_prefix() -> String {
    crate::DEFAULT_DESTINATION_PREFIX.to_string()
}

fn default_retry_initial_backoff_ms() -> u64 {
    100
}

fn default_retry_max_backoff_ms() -> u64 {
    5_000
}

/// Durable spillover queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QueueConfig {
    /// Buffer sink messages through the queue
    #[serde(default)]
    pub enabled: bool,

    /// Directory holding the `{name}.fifo` files
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// In-memory ring capacity (entries)
    #[serde(default = "default_memory_capacity")]
    #[validate(range(min = 1))]
    pub memory_capacity: usize,

    /// On-disk log capacity (bytes)
    #[serde(default = "default_disk_capacity_bytes")]
    #[validate(range(min = 64))]
    pub disk_capacity_bytes: u64,

    /// Period of the background compaction (0 = disabled)
    #[serde(default = "default_compaction_interval_ms")]
    pub compaction_interval_ms: u64,

    /// Number of workers draining the queue
    #[serde(default = "default_workers")]
    #[validate(range(min = 1))]
    pub workers: usize,
}

impl QueueConfig {
    pub fn compaction_interval(&self) -> Option<Duration> {
        (self.compaction_interval_ms > 0).then(|| Duration::from_millis(self.compaction_interval_ms))
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_dir: default_base_dir(),
            memory_capacity: default_memory_capacity(),
            disk_capacity_bytes: default_disk_capacity_bytes(),
            compaction_interval_ms: default_compaction_interval_ms(),
            workers: default_workers(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("./data/queue")
}

fn default_memory_capacity() -> usize {
    1_000
}

fn default_disk_capacity_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_compaction_interval_ms() -> u64 {
    10_000
}

fn default_workers() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IpcConfig::default();
        assert_eq!(config.identity.location, "Default");
        assert_eq!(config.rpc.default_timeout(), Duration::from_secs(20));
        assert_eq!(config.sink.effective_chunk_size(), DEFAULT_MAX_CHUNK_SIZE);
        assert!(!config.queue.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_size_is_clamped() {
        let sink = SinkConfig {
            max_chunk_size: 10 * DEFAULT_MAX_CHUNK_SIZE,
            ..Default::default()
        };
        assert_eq!(sink.effective_chunk_size(), DEFAULT_MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_validator_rejects_zero_capacity() {
        let config = IpcConfig {
            queue: QueueConfig {
                memory_capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
