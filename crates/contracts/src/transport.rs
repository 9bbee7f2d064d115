//! Transport seams - send/receive primitives exposed by the message broker.
//!
//! Two shapes are needed: a blocking-until-accepted send for sink chunks and a
//! callback-based send for RPC.

use std::time::Duration;

use bytes::Bytes;

use crate::{Envelope, TransportFault};

/// What the broker reports once it accepted a sink chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendReceipt {
    /// Shard/partition the chunk landed in. `None` when the transport has no
    /// such notion, which disables shard-drift detection.
    pub shard: Option<i32>,
}

impl SendReceipt {
    pub fn in_shard(shard: i32) -> Self {
        Self { shard: Some(shard) }
    }
}

/// Sink send path
///
/// Must be safely callable from many tasks at once.
#[trait_variant::make(SinkTransport: Send)]
pub trait LocalSinkTransport {
    /// Send one encoded chunk and wait until the broker accepted it
    async fn send(
        &self,
        destination: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<SendReceipt, TransportFault>;
}

/// Completion handler for an RPC send. Invoked at most once, on a
/// transport-owned thread or task.
pub type RpcCallback = Box<dyn FnOnce(Result<Bytes, TransportFault>) + Send + 'static>;

/// RPC send path
pub trait RpcTransport: Send + Sync {
    /// Hand the envelope to the broker and return.
    ///
    /// Nominally non-blocking, but callers must not rely on it: some brokers
    /// block here. `timeout` bounds the wait for the reply, after which the
    /// callback receives [`TransportFault::Timeout`]. An `Err` return means
    /// the envelope was not accepted and the callback will not run.
    fn async_send(
        &self,
        envelope: Envelope,
        timeout: Duration,
        on_complete: RpcCallback,
    ) -> Result<(), TransportFault>;
}
