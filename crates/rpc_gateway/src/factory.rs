//! RpcClientFactory - hands out per-module clients sharing one transport

use std::sync::Arc;
use std::time::Duration;

use contracts::{IpcConfig, IpcError, RpcModule, RpcTransport};
use tokio::runtime::Handle;
use tracing::info;

use crate::client::RpcClient;

/// State shared by every client of a factory
pub(crate) struct Shared<T: ?Sized> {
    pub(crate) transport: Arc<T>,
    pub(crate) location: String,
    pub(crate) default_timeout: Duration,
    pub(crate) runtime: Handle,
}

pub struct RpcClientFactory<T: ?Sized> {
    shared: Arc<Shared<T>>,
}

impl<T: ?Sized> Clone for RpcClientFactory<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> RpcClientFactory<T>
where
    T: RpcTransport + ?Sized + 'static,
{
    /// Build a factory for the process at `location`.
    ///
    /// Must be called inside a tokio runtime; the runtime is kept to run
    /// sends and local executions.
    pub fn new(
        transport: Arc<T>,
        location: impl Into<String>,
        default_timeout: Duration,
    ) -> Result<Self, IpcError> {
        let runtime = Handle::try_current()
            .map_err(|e| IpcError::config("runtime", format!("no tokio runtime: {e}")))?;
        let location = location.into();
        if default_timeout.is_zero() {
            return Err(IpcError::config("rpc.default_timeout_ms", "must be positive"));
        }
        info!(
            location = %location,
            default_timeout_ms = default_timeout.as_millis() as u64,
            "RPC client factory ready"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                transport,
                location,
                default_timeout,
                runtime,
            }),
        })
    }

    pub fn from_config(transport: Arc<T>, config: &IpcConfig) -> Result<Self, IpcError> {
        Self::new(
            transport,
            config.identity.location.clone(),
            config.rpc.default_timeout(),
        )
    }

    pub fn get_client<M: RpcModule>(&self, module: Arc<M>) -> RpcClient<M, T> {
        RpcClient::new(module, Arc::clone(&self.shared))
    }

    pub fn location(&self) -> &str {
        &self.shared.location
    }

    pub fn default_timeout(&self) -> Duration {
        self.shared.default_timeout
    }
}
