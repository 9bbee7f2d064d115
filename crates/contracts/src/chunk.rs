//! Chunk - size-bounded slice of a sink payload, tagged for ordered reassembly.

use serde::{Deserialize, Serialize};

use crate::{IpcError, TracingInfo};

/// Wire unit of the sink path.
///
/// `tracing_info` is only populated on the final chunk of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub message_id: String,
    pub chunk_index: i32,
    pub total_chunks: i32,
    #[serde(with = "serde_bytes")]
    pub content: Vec<u8>,
    #[serde(default)]
    pub tracing_info: TracingInfo,
}

impl Chunk {
    /// Whether this is the final chunk of its message
    pub fn is_last(&self) -> bool {
        self.chunk_index + 1 == self.total_chunks
    }

    /// Encode for the wire
    pub fn encode(&self) -> Result<Vec<u8>, IpcError> {
        bincode::serialize(self)
            .map_err(|e| IpcError::marshal(format!("chunk encode error: {e}")))
    }

    /// Decode from the wire
    pub fn decode(bytes: &[u8]) -> Result<Self, IpcError> {
        bincode::deserialize(bytes)
            .map_err(|e| IpcError::marshal(format!("chunk decode error: {e}")))
    }
}
