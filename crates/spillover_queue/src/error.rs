//! Queue errors

use std::io;
use std::path::PathBuf;

use contracts::IpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Unrecoverable I/O while appending to the disk log
    #[error("write failed for queue '{queue}': {source}")]
    WriteFailed {
        queue: String,
        #[source]
        source: io::Error,
    },

    /// A single entry can never fit into the disk tier
    #[error("entry of {size} bytes exceeds the disk capacity of queue '{queue}' ({capacity} bytes)")]
    EntryTooLarge {
        queue: String,
        size: u64,
        capacity: u64,
    },

    /// Blocking call aborted by `interrupt()` or a cancellation token
    #[error("queue '{queue}' interrupted")]
    Interrupted { queue: String },

    /// Another owner holds the log file
    #[error("queue file {} is locked by another owner", path.display())]
    Locked { path: PathBuf },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid queue options: {0}")]
    InvalidOptions(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl QueueError {
    pub(crate) fn write_failed(queue: &str, source: io::Error) -> Self {
        Self::WriteFailed {
            queue: queue.to_string(),
            source,
        }
    }

    pub(crate) fn interrupted(queue: &str) -> Self {
        Self::Interrupted {
            queue: queue.to_string(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

impl From<QueueError> for IpcError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::WriteFailed { queue, source } => IpcError::WriteFailed {
                message: source.to_string(),
                queue,
                source: Some(Box::new(source)),
            },
            QueueError::EntryTooLarge {
                queue,
                size,
                capacity,
            } => IpcError::write_failed(
                queue,
                format!("entry of {size} bytes exceeds disk capacity ({capacity} bytes)"),
            ),
            QueueError::Interrupted { queue } => IpcError::Interrupted { resource: queue },
            QueueError::Locked { path } => IpcError::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("queue file {} is locked", path.display()),
            )),
            QueueError::Codec(message) => IpcError::marshal(message),
            QueueError::InvalidOptions(message) => IpcError::config("queue", message),
            QueueError::Io(e) => IpcError::Io(e),
        }
    }
}
