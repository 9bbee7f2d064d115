//! # Broker
//!
//! 进程内消息代理，同时实现 Sink 与 RPC 两种传输。
//!
//! - 分区主题：按 key 哈希选择分区，可强制指定分区以模拟漂移
//! - RPC：按 location / system id 绑定模块
//! - 故障注入：瞬时故障、阻塞发送、丢失回复、停止

mod broker;
mod rpc;

pub use broker::{Delivery, InMemoryBroker};
pub use rpc::RpcHandler;
