//! Layered error definitions
//!
//! Categorized by where the failure is observed: rpc / sink / queue / config

use thiserror::Error;

/// Boxed error used to carry an underlying cause across crate boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fault reported by a transport, before it is mapped into [`IpcError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFault {
    /// The broker gave up waiting (send or reply deadline exceeded)
    #[error("broker timeout: {0}")]
    Timeout(String),

    /// Nobody is listening on the requested route
    #[error("no consumer available: {0}")]
    NoConsumer(String),

    /// Broker offline or not yet initialized
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// Anything the transport could not categorize
    #[error("{0}")]
    Other(String),
}

impl TransportFault {
    /// Faults worth retrying on the fire-and-forget path.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// Unified error type
#[derive(Debug, Error)]
pub enum IpcError {
    // ===== RPC Errors =====
    /// Could not dispatch: no remote listener, stopped transport, or the send
    /// itself did not return in time
    #[error("request rejected: {message}")]
    RequestRejected {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Deadline exceeded after dispatch
    #[error("request timed out: {message}")]
    RequestTimedOut { message: String },

    /// The remote side executed the request and reported an application error
    #[error("remote execution failed: {message}")]
    RemoteExecution { message: String },

    /// A locally executed module failed; the original error is kept as source
    #[error("module '{module}' failed: {source}")]
    Module {
        module: String,
        #[source]
        source: BoxError,
    },

    // ===== Sink / Queue Errors =====
    /// Unrecoverable durable queue I/O
    #[error("write failed for queue '{queue}': {message}")]
    WriteFailed {
        queue: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Uncategorized transport fault, passed through
    #[error("transport error: {0}")]
    Transport(#[source] TransportFault),

    /// A blocking call was cancelled before it completed; nothing was lost
    #[error("interrupted while waiting on '{resource}'")]
    Interrupted { resource: String },

    // ===== General Errors =====
    /// Payload (un)marshalling failure
    #[error("marshal error: {message}")]
    Marshal { message: String },

    /// Configuration error
    #[error("config error at '{field}': {message}")]
    Config { field: String, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IpcError {
    /// Create a request rejected error
    pub fn request_rejected(message: impl Into<String>) -> Self {
        Self::RequestRejected {
            message: message.into(),
            source: None,
        }
    }

    /// Create a request rejected error that keeps its cause
    pub fn request_rejected_by(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::RequestRejected {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a request timed out error
    pub fn request_timed_out(message: impl Into<String>) -> Self {
        Self::RequestTimedOut {
            message: message.into(),
        }
    }

    /// Create a remote execution error
    pub fn remote_execution(message: impl Into<String>) -> Self {
        Self::RemoteExecution {
            message: message.into(),
        }
    }

    /// Wrap a local module failure
    pub fn module(module: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Module {
            module: module.into(),
            source: source.into(),
        }
    }

    /// Create a write failed error
    pub fn write_failed(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            queue: queue.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a marshal error
    pub fn marshal(message: impl Into<String>) -> Self {
        Self::Marshal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }
}
