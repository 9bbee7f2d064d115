//! # Observability
//!
//! Logging setup and the metrics emitted by the IPC layer.
//!
//! Metrics go through the `metrics` facade; they are only exported once a
//! recorder is installed (see [`init_metrics_only`]). Without one every
//! `record_*` call is a no-op.
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `ipc_rpc_requests_sent_total` | counter | location, module |
//! | `ipc_rpc_failed_total` | counter | location, module |
//! | `ipc_rpc_duration_ms` | histogram | location, module |
//! | `ipc_rpc_response_size_bytes` | histogram | location, module |
//! | `ipc_sink_chunks_sent_total` | counter | module |
//! | `ipc_sink_messages_total` | counter | module, status |
//! | `ipc_sink_shard_drift_total` | counter | module |
//! | `ipc_sink_retries_total` | counter | module |
//! | `ipc_queue_depth` | gauge | queue, tier |
//! | `ipc_queue_enqueued_total` | counter | queue, residency |
//! | `ipc_queue_dropped_total` | counter | queue |
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig::from_verbosity(1, false, LogFormat::Compact))?;
//! observability::record_rpc_request_sent("Default", "Echo");
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    record_queue_depth, record_queue_dropped, record_queue_enqueued, record_rpc_duration_ms,
    record_rpc_failed, record_rpc_request_sent, record_rpc_response_size, record_sink_chunk_sent,
    record_sink_dispatched, record_sink_retry, record_sink_shard_drift, MetricsSummary,
    RpcMetricsAggregator, RunningStats, StatsSummary,
};

/// Logging and exporter settings
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus listener port (None = no exporter)
    pub metrics_port: Option<u16>,
    /// Filter used when `RUST_LOG` is unset or ignored
    pub log_level: String,
    /// Let `RUST_LOG` override `log_level`
    pub honor_rust_log: bool,
}

impl ObservabilityConfig {
    /// Level from a `-v` count. `quiet` pins the level to `warn`, ignoring `RUST_LOG`.
    pub fn from_verbosity(verbose: u8, quiet: bool, log_format: LogFormat) -> Self {
        let log_level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        Self {
            log_format,
            metrics_port: None,
            log_level: log_level.to_string(),
            honor_rust_log: !quiet,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(&self.log_level);
        if self.honor_rust_log {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback())
        } else {
            fallback()
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            log_level: "info".to_string(),
            honor_rust_log: true,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        // Span fields (message_id, location, rpc.failed) land in each JSON line
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}

/// Install the global subscriber and, if a port is set, the Prometheus exporter.
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer(config.log_format))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        log_level = %config.log_level,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// Install only the Prometheus recorder, serving `/metrics` on `port`.
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.log_level, "info");
        assert!(config.honor_rust_log);
    }

    #[test]
    fn test_verbosity_levels() {
        let level = |v, q| ObservabilityConfig::from_verbosity(v, q, LogFormat::Compact).log_level;
        assert_eq!(level(0, false), "info");
        assert_eq!(level(1, false), "debug");
        assert_eq!(level(3, false), "trace");
        assert_eq!(level(2, true), "warn");
    }

    #[test]
    fn test_quiet_ignores_rust_log() {
        let config = ObservabilityConfig::from_verbosity(0, true, LogFormat::Json);
        assert!(!config.honor_rust_log);
        assert_eq!(config.metrics_port, None);
    }
}
