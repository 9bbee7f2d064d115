//! SendGuard - bounded-time wrapper around `RpcTransport::async_send`
//!
//! Some brokers block inside `async_send`. The call runs on a blocking
//! worker; if it does not return in time the worker is abandoned.

use std::sync::Arc;
use std::time::Duration;

use contracts::{Envelope, IpcError, RpcCallback, RpcTransport};
use tokio::runtime::Handle;
use tracing::warn;

pub(crate) async fn guarded_send<T>(
    runtime: &Handle,
    transport: Arc<T>,
    envelope: Envelope,
    timeout: Duration,
    on_complete: RpcCallback,
) -> Result<(), IpcError>
where
    T: RpcTransport + ?Sized + 'static,
{
    let message_id = envelope.id.clone();
    let worker = runtime.spawn_blocking(move || transport.async_send(envelope, timeout, on_complete));

    match tokio::time::timeout(timeout, worker).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(fault))) => Err(IpcError::request_rejected_by(
            "transport refused the request",
            fault,
        )),
        Ok(Err(join_error)) => Err(IpcError::request_rejected(format!(
            "send worker failed: {join_error}"
        ))),
        Err(_) => {
            warn!(
                message_id = %message_id,
                timeout_ms = timeout.as_millis() as u64,
                "Transport send did not return in time, abandoning it"
            );
            Err(IpcError::request_rejected(format!(
                "send did not return within {timeout:?}"
            )))
        }
    }
}
