//! Echo module, used for connectivity checks.

use std::time::Duration;

use contracts::{IpcError, RpcModule, RpcRequest, RpcResponse, TracingInfo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoRequest {
    pub message: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub system_id: Option<String>,
    /// Time to live in milliseconds
    #[serde(default)]
    pub time_to_live_ms: Option<u64>,
    /// Sleep this long before answering
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Fail with `message` instead of echoing it
    #[serde(default)]
    pub should_throw: bool,
    #[serde(default)]
    pub tracing_info: TracingInfo,
}

impl EchoRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn on_system(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = Some(delay.as_millis() as u64);
        self
    }

    pub fn failing(mut self) -> Self {
        self.should_throw = true;
        self
    }
}

impl RpcRequest for EchoRequest {
    fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    fn time_to_live(&self) -> Option<Duration> {
        self.time_to_live_ms.map(Duration::from_millis)
    }

    fn tracing_info(&self) -> TracingInfo {
        self.tracing_info.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl RpcResponse for EchoResponse {
    fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Failure raised on request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EchoError(pub String);

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoRpcModule;

impl EchoRpcModule {
    pub const ID: &'static str = "Echo";
}

impl RpcModule for EchoRpcModule {
    type Request = EchoRequest;
    type Response = EchoResponse;

    fn id(&self) -> &str {
        Self::ID
    }

    async fn execute(&self, request: EchoRequest) -> Result<EchoResponse, IpcError> {
        if let Some(delay) = request.delay_ms.filter(|ms| *ms > 0) {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if request.should_throw {
            return Err(IpcError::module(Self::ID, EchoError(request.message)));
        }
        Ok(EchoResponse {
            message: request.message,
            error: None,
        })
    }

    fn error_response(&self, message: String) -> EchoResponse {
        EchoResponse {
            message: String::new(),
            error: Some(message),
        }
    }
}
