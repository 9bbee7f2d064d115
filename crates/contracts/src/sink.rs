//! SinkModule trait - fire-and-forget message contract
//!
//! Defines how a sink message is marshalled and keyed.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::IpcError;

/// Default prefix for sink destinations
pub const DEFAULT_DESTINATION_PREFIX: &str = "ipc.sink";

/// Sink module
///
/// All sink producers implement this trait. Marshalling defaults to JSON.
pub trait SinkModule: Send + Sync + 'static {
    type Message: Serialize + DeserializeOwned + Send + Sync;

    /// Module id (used for logging/metrics and destination naming)
    fn id(&self) -> &str;

    /// Routing key for shard selection; None lets the dispatcher pick the message id
    fn routing_key(&self, _message: &Self::Message) -> Option<String> {
        None
    }

    fn marshal(&self, message: &Self::Message) -> Result<Bytes, IpcError> {
        serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| IpcError::marshal(format!("{} message: {e}", self.id())))
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Self::Message, IpcError> {
        serde_json::from_slice(bytes)
            .map_err(|e| IpcError::marshal(format!("{} message: {e}", self.id())))
    }
}

/// Destination (topic) name for a module
pub fn sink_destination(prefix: &str, module_id: &str) -> String {
    format!("{prefix}.{module_id}")
}
