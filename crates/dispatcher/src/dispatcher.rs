//! SinkDispatcher - chunked fire-and-forget delivery

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, field, instrument, warn, Span};

use contracts::{
    current_thread_name, inject_span, sink_destination, Chunk, Envelope, IpcError, SendReceipt,
    SinkConfig, SinkModule, SinkTransport, TracingInfo, DEFAULT_MAX_CHUNK_SIZE, TAG_DESTINATION,
    TAG_LOCATION, TAG_MESSAGE_SIZE, TAG_THREAD,
};

use crate::chunker::{chunk_count, split_payload};
use crate::metrics::SinkMetrics;

/// Backoff between retries of a transient send fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Attempts per chunk, first try included (None = unbounded)
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SinkConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SinkConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(config.retry_max_backoff_ms),
            max_attempts: config.retry_max_attempts,
        }
    }

    /// Retry at once, forever
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Delay after the `attempt`-th failure (1-based), doubling up to the ceiling
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Whether `attempts` tries use up the budget
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Outcome of one pass over all chunks
enum Attempt {
    Accepted,
    ShardDrift {
        chunk_index: usize,
        expected: i32,
        actual: i32,
    },
}

/// Splits sink messages into chunks and sends them over a [`SinkTransport`].
///
/// All chunks of a message must land in the shard of the first one; if the
/// broker reports otherwise the whole message is sent again.
pub struct SinkDispatcher<T> {
    transport: Arc<T>,
    location: String,
    destination_prefix: String,
    max_chunk_size: usize,
    retry: RetryPolicy,
    metrics: Arc<SinkMetrics>,
}

impl<T> SinkDispatcher<T>
where
    T: SinkTransport + Sync + 'static,
{
    pub fn new(transport: Arc<T>, config: &SinkConfig, location: impl Into<String>) -> Self {
        Self {
            transport,
            location: location.into(),
            destination_prefix: config.destination_prefix.clone(),
            max_chunk_size: config.effective_chunk_size().max(1),
            retry: RetryPolicy::from_config(config),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the chunk size, still bounded by [`DEFAULT_MAX_CHUNK_SIZE`]
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size.clamp(1, DEFAULT_MAX_CHUNK_SIZE);
        self
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Default destination of a module
    pub fn destination_for(&self, module_id: &str) -> String {
        sink_destination(&self.destination_prefix, module_id)
    }

    /// Marshal `message` into an envelope bound for `destination`.
    pub fn envelope_for<M: SinkModule>(
        &self,
        module: &M,
        destination: &str,
        message: &M::Message,
    ) -> Result<Envelope, IpcError> {
        let payload = module.marshal(message)?;
        Ok(Envelope::new(module.id(), payload)
            .with_destination(Some(destination.to_string()))
            .with_routing_key(module.routing_key(message)))
    }

    /// Send `message` and return once every chunk was accepted.
    ///
    /// Only fatal transport faults (or an exhausted retry budget) return early.
    pub async fn dispatch<M: SinkModule>(
        &self,
        module: &M,
        destination: &str,
        message: &M::Message,
    ) -> Result<(), IpcError> {
        let envelope = self.envelope_for(module, destination, message)?;
        self.dispatch_envelope(&envelope).await
    }

    /// Send an already marshalled envelope.
    ///
    /// The destination is `destination_location`, or the module's default
    /// destination when unset.
    #[instrument(
        name = "sink_dispatch",
        skip_all,
        fields(
            module = %envelope.module_id,
            message_id = %envelope.id,
            destination = field::Empty,
            message_size = field::Empty,
            thread = field::Empty
        )
    )]
    pub async fn dispatch_envelope(&self, envelope: &Envelope) -> Result<(), IpcError> {
        let destination = envelope
            .destination_location
            .clone()
            .unwrap_or_else(|| self.destination_for(&envelope.module_id));

        match self.send_until_consistent(&destination, envelope).await {
            Ok(()) => {
                self.metrics.inc_dispatched_count();
                observability::record_sink_dispatched(&envelope.module_id, true);
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_failure_count();
                observability::record_sink_dispatched(&envelope.module_id, false);
                error!(
                    destination = %destination,
                    message_id = %envelope.id,
                    error = %e,
                    "Sink dispatch failed"
                );
                Err(e)
            }
        }
    }

    async fn send_until_consistent(
        &self,
        destination: &str,
        envelope: &Envelope,
    ) -> Result<(), IpcError> {
        let mut round: u32 = 0;
        loop {
            round += 1;
            match self.send_chunks(destination, envelope).await? {
                Attempt::Accepted => {
                    debug!(
                        destination = %destination,
                        message_id = %envelope.id,
                        rounds = round,
                        "Message accepted"
                    );
                    return Ok(());
                }
                Attempt::ShardDrift {
                    chunk_index,
                    expected,
                    actual,
                } => {
                    self.metrics.inc_shard_drift_count();
                    observability::record_sink_shard_drift(&envelope.module_id);
                    warn!(
                        destination = %destination,
                        message_id = %envelope.id,
                        chunk_index,
                        expected_shard = expected,
                        actual_shard = actual,
                        round,
                        "Shard changed mid-message, resending from first chunk"
                    );
                }
            }
        }
    }

    async fn send_chunks(&self, destination: &str, envelope: &Envelope) -> Result<Attempt, IpcError> {
        let total = chunk_count(envelope.payload.len(), self.max_chunk_size);
        let mut first_shard: Option<i32> = None;

        for (index, content) in split_payload(&envelope.payload, self.max_chunk_size).enumerate() {
            let is_last = index + 1 == total;
            let chunk = Chunk {
                message_id: envelope.id.clone(),
                chunk_index: index as i32,
                total_chunks: total as i32,
                content: content.to_vec(),
                tracing_info: if is_last {
                    self.final_tracing_info(destination, envelope)
                } else {
                    TracingInfo::new()
                },
            };
            let bytes = Bytes::from(chunk.encode()?);

            let receipt = self
                .send_with_retry(destination, envelope, index, bytes)
                .await?;
            self.metrics.inc_chunks_sent();
            observability::record_sink_chunk_sent(&envelope.module_id);

            if total > 1 {
                match (first_shard, receipt.shard) {
                    (None, shard) if index == 0 => first_shard = shard,
                    (Some(expected), Some(actual)) if expected != actual => {
                        return Ok(Attempt::ShardDrift {
                            chunk_index: index,
                            expected,
                            actual,
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(Attempt::Accepted)
    }

    /// Tags attached to the final chunk; also fills the dispatch span fields.
    fn final_tracing_info(&self, destination: &str, envelope: &Envelope) -> TracingInfo {
        let span = Span::current();
        let thread = current_thread_name();
        span.record("destination", destination);
        span.record("message_size", envelope.payload.len());
        span.record("thread", thread.as_str());

        let mut info = envelope.tracing_info.clone();
        inject_span(&mut info, &span);
        info.insert(TAG_LOCATION.to_string(), self.location.clone());
        info.insert(TAG_THREAD.to_string(), thread);
        info.insert(TAG_DESTINATION.to_string(), destination.to_string());
        info.insert(
            TAG_MESSAGE_SIZE.to_string(),
            envelope.payload.len().to_string(),
        );
        info
    }

    async fn send_with_retry(
        &self,
        destination: &str,
        envelope: &Envelope,
        chunk_index: usize,
        bytes: Bytes,
    ) -> Result<SendReceipt, IpcError> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self
                .transport
                .send(destination, &envelope.routing_key, bytes.clone())
                .await
            {
                Ok(receipt) => return Ok(receipt),
                Err(fault) if fault.is_transient() => {
                    if self.retry.exhausted(attempts) {
                        error!(
                            destination = %destination,
                            message_id = %envelope.id,
                            chunk_index,
                            attempts,
                            error = %fault,
                            "Retry budget exhausted"
                        );
                        return Err(IpcError::Transport(fault));
                    }
                    let delay = self.retry.backoff(attempts);
                    self.metrics.inc_retry_count();
                    observability::record_sink_retry(&envelope.module_id);
                    warn!(
                        destination = %destination,
                        message_id = %envelope.id,
                        chunk_index,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %fault,
                        "Transient fault sending chunk, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(fault) => return Err(IpcError::Transport(fault)),
            }
        }
    }
}
