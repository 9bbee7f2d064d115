//! RPC module contracts
//!
//! A module pairs a request type with a response type and knows how to
//! execute requests locally and how to (un)marshal both sides.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{IpcError, TracingInfo};

/// Request routed through the RPC gateway.
pub trait RpcRequest: Send + 'static {
    /// Target location (None = execute locally)
    fn location(&self) -> Option<&str>;

    /// Specific system at the target location
    fn system_id(&self) -> Option<&str> {
        None
    }

    /// Per-request time to live, bounded by the gateway's default timeout
    fn time_to_live(&self) -> Option<Duration> {
        None
    }

    /// Custom tags propagated with the request
    fn tracing_info(&self) -> TracingInfo {
        TracingInfo::new()
    }

    /// Inbound span the RPC span should be parented to
    fn parent_span(&self) -> Option<&tracing::Span> {
        None
    }
}

/// Response returned by an RPC module.
pub trait RpcResponse: Send + 'static {
    /// Application-level error reported by the remote side
    fn error_message(&self) -> Option<&str>;
}

/// RPC module
///
/// Marshalling defaults to JSON; override for other encodings.
pub trait RpcModule: Send + Sync + 'static {
    type Request: RpcRequest + Serialize + DeserializeOwned;
    type Response: RpcResponse + Serialize + DeserializeOwned;

    /// Module id (used for routing, metrics and span names)
    fn id(&self) -> &str;

    /// Execute the request in-process
    fn execute(
        &self,
        request: Self::Request,
    ) -> impl Future<Output = Result<Self::Response, IpcError>> + Send;

    /// Build the response sent back when execution fails on the serving side
    fn error_response(&self, message: String) -> Self::Response;

    fn marshal_request(&self, request: &Self::Request) -> Result<Bytes, IpcError> {
        serde_json::to_vec(request)
            .map(Bytes::from)
            .map_err(|e| IpcError::marshal(format!("{} request: {e}", self.id())))
    }

    fn unmarshal_request(&self, bytes: &[u8]) -> Result<Self::Request, IpcError> {
        serde_json::from_slice(bytes)
            .map_err(|e| IpcError::marshal(format!("{} request: {e}", self.id())))
    }

    fn marshal_response(&self, response: &Self::Response) -> Result<Bytes, IpcError> {
        serde_json::to_vec(response)
            .map(Bytes::from)
            .map_err(|e| IpcError::marshal(format!("{} response: {e}", self.id())))
    }

    fn unmarshal_response(&self, bytes: &[u8]) -> Result<Self::Response, IpcError> {
        serde_json::from_slice(bytes)
            .map_err(|e| IpcError::marshal(format!("{} response: {e}", self.id())))
    }
}
