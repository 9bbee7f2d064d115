//! Serving side of RPC: type-erased module execution.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use contracts::{RpcModule, TransportFault};
use tracing::{debug, warn};

/// Boxed reply future
pub type ReplyFuture = Pin<Box<dyn Future<Output = Result<Bytes, TransportFault>> + Send>>;

/// Executes marshalled requests for one module.
pub trait RpcHandler: Send + Sync {
    fn module_id(&self) -> &str;

    fn handle(&self, request: Bytes) -> ReplyFuture;
}

/// Serves an [`RpcModule`]; execution failures become error responses.
pub(crate) struct ModuleHandler<M> {
    module: Arc<M>,
}

impl<M: RpcModule> ModuleHandler<M> {
    pub(crate) fn new(module: Arc<M>) -> Self {
        Self { module }
    }
}

impl<M: RpcModule> RpcHandler for ModuleHandler<M> {
    fn module_id(&self) -> &str {
        self.module.id()
    }

    fn handle(&self, request: Bytes) -> ReplyFuture {
        let module = Arc::clone(&self.module);
        Box::pin(async move {
            let response = match module.unmarshal_request(&request) {
                Ok(request) => match module.execute(request).await {
                    Ok(response) => response,
                    Err(e) => {
                        debug!(module = %module.id(), error = %e, "Module execution failed");
                        module.error_response(e.to_string())
                    }
                },
                Err(e) => {
                    warn!(module = %module.id(), error = %e, "Undecodable request");
                    module.error_response(e.to_string())
                }
            };
            module
                .marshal_response(&response)
                .map_err(|e| TransportFault::Other(e.to_string()))
        })
    }
}
