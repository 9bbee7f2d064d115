//! IPC 指标收集模块
//!
//! RPC / Sink / 队列三类遥测的记录函数，以及用于命令行摘要的内存聚合器。

use std::time::Duration;

use contracts::IpcError;
use metrics::{counter, gauge, histogram};

// ===== RPC =====

/// 记录 RPC 请求已发出（无论结果如何）
pub fn record_rpc_request_sent(location: &str, module: &str) {
    counter!(
        "ipc_rpc_requests_sent_total",
        "location" => location.to_string(),
        "module" => module.to_string()
    )
    .increment(1);
}

/// 记录 RPC 失败
pub fn record_rpc_failed(location: &str, module: &str) {
    counter!(
        "ipc_rpc_failed_total",
        "location" => location.to_string(),
        "module" => module.to_string()
    )
    .increment(1);
}

/// 记录 RPC 往返耗时
pub fn record_rpc_duration_ms(location: &str, module: &str, elapsed: Duration) {
    histogram!(
        "ipc_rpc_duration_ms",
        "location" => location.to_string(),
        "module" => module.to_string()
    )
    .record(elapsed.as_secs_f64() * 1000.0);
}

/// 记录 RPC 响应大小
pub fn record_rpc_response_size(location: &str, module: &str, bytes: usize) {
    histogram!(
        "ipc_rpc_response_size_bytes",
        "location" => location.to_string(),
        "module" => module.to_string()
    )
    .record(bytes as f64);
}

// ===== Sink =====

/// 记录已发送的分片
pub fn record_sink_chunk_sent(module: &str) {
    counter!("ipc_sink_chunks_sent_total", "module" => module.to_string()).increment(1);
}

/// 记录完整消息分发结果
pub fn record_sink_dispatched(module: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "ipc_sink_messages_total",
        "module" => module.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录分片漂移导致的重发
pub fn record_sink_shard_drift(module: &str) {
    counter!("ipc_sink_shard_drift_total", "module" => module.to_string()).increment(1);
}

/// 记录瞬时故障重试
pub fn record_sink_retry(module: &str) {
    counter!("ipc_sink_retries_total", "module" => module.to_string()).increment(1);
}

// ===== Queue =====

/// 记录队列深度（按层）
pub fn record_queue_depth(queue: &str, memory: usize, disk: usize) {
    gauge!(
        "ipc_queue_depth",
        "queue" => queue.to_string(),
        "tier" => "memory"
    )
    .set(memory as f64);
    gauge!(
        "ipc_queue_depth",
        "queue" => queue.to_string(),
        "tier" => "disk"
    )
    .set(disk as f64);
}

/// 记录入队位置
pub fn record_queue_enqueued(queue: &str, residency: &str) {
    counter!(
        "ipc_queue_enqueued_total",
        "queue" => queue.to_string(),
        "residency" => residency.to_string()
    )
    .increment(1);
}

/// 记录出队后分发失败而被丢弃的条目
pub fn record_queue_dropped(queue: &str) {
    counter!("ipc_queue_dropped_total", "queue" => queue.to_string()).increment(1);
}

/// RPC 结果聚合器
///
/// 在内存中聚合往返结果，便于命令行输出摘要。
#[derive(Debug, Clone, Default)]
pub struct RpcMetricsAggregator {
    /// 总请求数
    pub total: u64,

    /// 成功数
    pub succeeded: u64,

    /// 超时数
    pub timed_out: u64,

    /// 被拒绝数
    pub rejected: u64,

    /// 其他失败
    pub failed: u64,

    /// 往返耗时统计 (毫秒)
    pub latency_ms: RunningStats,
}

impl RpcMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次调用结果
    pub fn update<T>(&mut self, result: &Result<T, IpcError>, elapsed: Duration) {
        self.total += 1;
        match result {
            Ok(_) => self.succeeded += 1,
            Err(IpcError::RequestTimedOut { .. }) => self.timed_out += 1,
            Err(IpcError::RequestRejected { .. }) => self.rejected += 1,
            Err(_) => self.failed += 1,
        }
        self.latency_ms.push(elapsed.as_secs_f64() * 1000.0);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total: self.total,
            succeeded: self.succeeded,
            timed_out: self.timed_out,
            rejected: self.rejected,
            failed: self.failed,
            success_rate: if self.total > 0 {
                self.succeeded as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
            latency_ms: StatsSummary::from(&self.latency_ms),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total: u64,
    pub succeeded: u64,
    pub timed_out: u64,
    pub rejected: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub latency_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== RPC Summary ===")?;
        writeln!(
            f,
            "Requests: {} ({:.2}% succeeded)",
            self.total, self.success_rate
        )?;
        writeln!(f, "Timed out: {}", self.timed_out)?;
        writeln!(f, "Rejected: {}", self.rejected)?;
        writeln!(f, "Other failures: {}", self.failed)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
