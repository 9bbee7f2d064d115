//! ChunkAssembler - consumer-side reassembly of chunked sink messages.

use std::collections::{BTreeMap, HashMap, VecDeque};

use bytes::Bytes;
use contracts::{Chunk, TracingInfo};
use tracing::{debug, warn};

/// Default bound on partially received messages
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1024;

/// Default bound on `total_chunks`
pub const DEFAULT_MAX_CHUNKS: i32 = 65_536;

/// A fully reassembled message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    pub message_id: String,
    pub payload: Bytes,
    /// Carried by the final chunk
    pub tracing_info: TracingInfo,
}

struct Partial {
    total: i32,
    /// Received parts keyed by chunk index
    parts: BTreeMap<i32, Vec<u8>>,
    tracing_info: TracingInfo,
}

impl Partial {
    fn new(total: i32) -> Self {
        Self {
            total,
            parts: BTreeMap::new(),
            tracing_info: TracingInfo::new(),
        }
    }

    fn insert(&mut self, chunk: Chunk) {
        if chunk.is_last() {
            self.tracing_info = chunk.tracing_info;
        }
        self.parts.insert(chunk.chunk_index, chunk.content);
    }

    fn received(&self) -> usize {
        self.parts.len()
    }

    fn is_complete(&self) -> bool {
        self.parts.len() == self.total as usize
    }

    fn into_payload(self) -> Bytes {
        let mut payload = Vec::with_capacity(self.parts.values().map(Vec::len).sum());
        for part in self.parts.into_values() {
            payload.extend_from_slice(&part);
        }
        Bytes::from(payload)
    }
}

/// Buffers chunks per message id until every piece arrived.
pub struct ChunkAssembler {
    pending: HashMap<String, Partial>,
    /// Insertion order, used for eviction
    order: VecDeque<String>,
    max_in_flight: usize,
    max_chunks: i32,
    evicted: u64,
    discarded: u64,
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

impl ChunkAssembler {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            pending: HashMap::new(),
            order: VecDeque::new(),
            max_in_flight: max_in_flight.max(1),
            max_chunks: DEFAULT_MAX_CHUNKS,
            evicted: 0,
            discarded: 0,
        }
    }

    /// Reject messages announcing more than `max_chunks` chunks
    pub fn with_max_chunks(mut self, max_chunks: i32) -> Self {
        self.max_chunks = max_chunks.max(1);
        self
    }

    /// Feed one chunk; returns the message once it is complete.
    ///
    /// Chunk 0 of a message already in progress starts that message over,
    /// which is what a sender does after shard drift.
    pub fn push(&mut self, chunk: Chunk) -> Option<AssembledMessage> {
        if chunk.total_chunks <= 0 || chunk.chunk_index < 0 || chunk.chunk_index >= chunk.total_chunks
        {
            warn!(
                message_id = %chunk.message_id,
                chunk_index = chunk.chunk_index,
                total_chunks = chunk.total_chunks,
                "Chunk index out of range, discarding message"
            );
            self.discard(&chunk.message_id);
            return None;
        }
        if chunk.total_chunks > self.max_chunks {
            warn!(
                message_id = %chunk.message_id,
                total_chunks = chunk.total_chunks,
                max_chunks = self.max_chunks,
                "Chunk count over limit, discarding message"
            );
            self.discard(&chunk.message_id);
            return None;
        }

        if chunk.total_chunks == 1 {
            self.remove(&chunk.message_id);
            return Some(AssembledMessage {
                message_id: chunk.message_id,
                payload: Bytes::from(chunk.content),
                tracing_info: chunk.tracing_info,
            });
        }

        let message_id = chunk.message_id.clone();
        match self.pending.get(&message_id) {
            Some(partial) if partial.total != chunk.total_chunks => {
                warn!(
                    message_id = %message_id,
                    expected = partial.total,
                    got = chunk.total_chunks,
                    "Inconsistent chunk count, discarding message"
                );
                self.discard(&message_id);
                if chunk.chunk_index != 0 {
                    return None;
                }
            }
            Some(_) if chunk.chunk_index == 0 => {
                debug!(message_id = %message_id, "Message restarted from first chunk");
                self.remove(&message_id);
            }
            _ => {}
        }

        if !self.pending.contains_key(&message_id) {
            self.make_room();
            self.pending
                .insert(message_id.clone(), Partial::new(chunk.total_chunks));
            self.order.push_back(message_id.clone());
        }

        let complete = match self.pending.get_mut(&message_id) {
            Some(partial) => {
                partial.insert(chunk);
                partial.is_complete()
            }
            None => false,
        };
        if !complete {
            return None;
        }

        let partial = self.remove(&message_id)?;
        let tracing_info = partial.tracing_info.clone();
        Some(AssembledMessage {
            message_id,
            payload: partial.into_payload(),
            tracing_info,
        })
    }

    /// Messages currently waiting for more chunks
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Partial messages dropped to respect the in-flight bound
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Partial messages dropped because their chunks were inconsistent
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn make_room(&mut self) {
        while self.pending.len() >= self.max_in_flight {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(partial) = self.pending.remove(&oldest) {
                self.evicted += 1;
                warn!(
                    message_id = %oldest,
                    received = partial.received(),
                    total_chunks = partial.total,
                    "Evicting incomplete message"
                );
            }
        }
    }

    fn discard(&mut self, message_id: &str) {
        if self.remove(message_id).is_some() {
            self.discarded += 1;
        }
    }

    fn remove(&mut self, message_id: &str) -> Option<Partial> {
        let partial = self.pending.remove(message_id)?;
        self.order.retain(|id| id != message_id);
        Some(partial)
    }
}
