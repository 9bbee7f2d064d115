//! Envelope - one outbound payload plus its routing/tracing metadata.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::TracingInfo;

/// Outbound application payload.
///
/// Created by the caller, destroyed on completion. Serializable so the
/// buffering sink frontend can park it in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique id, doubles as the RPC correlation id and the sink message id
    pub id: String,

    /// Id of the module that produced the payload
    pub module_id: String,

    /// Target location (None = local)
    pub destination_location: Option<String>,

    /// Specific system at the target location
    pub system_id: Option<String>,

    /// Serialized payload
    pub payload: Bytes,

    /// Key used by the broker for shard selection
    pub routing_key: String,

    /// Propagated tracing tags
    #[serde(default)]
    pub tracing_info: TracingInfo,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Envelope {
    /// Create an envelope with a fresh id; the routing key defaults to the id.
    pub fn new(module_id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            routing_key: id.clone(),
            id,
            module_id: module_id.into(),
            destination_location: None,
            system_id: None,
            payload: payload.into(),
            tracing_info: TracingInfo::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_destination(mut self, location: Option<String>) -> Self {
        self.destination_location = location;
        self
    }

    pub fn with_system_id(mut self, system_id: Option<String>) -> Self {
        self.system_id = system_id;
        self
    }

    /// Override the routing key; `None` keeps the id-derived key.
    pub fn with_routing_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key {
            self.routing_key = key;
        }
        self
    }

    pub fn with_tracing_info(mut self, tracing_info: TracingInfo) -> Self {
        self.tracing_info = tracing_info;
        self
    }

    /// True when the envelope targets the given local location (or no location).
    pub fn is_local(&self, local_location: &str) -> bool {
        match self.destination_location.as_deref() {
            None => true,
            Some(location) => location == local_location,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
