//! # RPC Gateway
//!
//! 请求/应答网关。
//!
//! - 本地 location 直接执行，不经过传输层
//! - 远程请求：有界时间发送、超时裁剪、失败分类
//! - 回调线程上恢复调用方 span

mod client;
mod echo;
mod factory;
mod future;
mod guard;

pub use client::RpcClient;
pub use echo::{EchoError, EchoRequest, EchoResponse, EchoRpcModule};
pub use factory::RpcClientFactory;
pub use future::RpcFuture;
