//! # Dispatcher
//!
//! Sink 分发模块。
//!
//! 负责：
//! - 将消息切分为不超过上限的分片并按顺序发送
//! - 分片落入不同 shard 时从第一个分片重发
//! - 瞬时故障重试，致命故障立即返回
//! - 接收端重组分片 (`ChunkAssembler`)
//! - 通过溢出队列缓冲发送 (`QueueingDispatcher`)

pub mod assembler;
pub mod chunker;
pub mod dispatcher;
pub mod metrics;
pub mod queueing;

pub use assembler::{AssembledMessage, ChunkAssembler, DEFAULT_MAX_CHUNKS};
pub use chunker::{chunk_count, split_payload};
pub use dispatcher::{RetryPolicy, SinkDispatcher};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use queueing::{EnvelopeQueue, QueueingDispatcher};
pub use spillover_queue::EnqueueResult;
