//! QueueingDispatcher - buffers sink messages in a spillover queue
//!
//! Producers only wait when the disk tier is full; worker tasks drain the
//! queue through a [`SinkDispatcher`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::{Envelope, IpcError, QueueConfig, SinkModule, SinkTransport};
use spillover_queue::{BincodeCodec, EnqueueResult, QueueOptions, SpilloverQueue};

use crate::dispatcher::SinkDispatcher;
use crate::metrics::SinkMetrics;

/// Queue holding marshalled sink envelopes
pub type EnvelopeQueue = SpilloverQueue<Envelope, BincodeCodec<Envelope>>;

/// Pause after an unexpected dequeue error
const DEQUEUE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct QueueingDispatcher<T> {
    dispatcher: Arc<SinkDispatcher<T>>,
    queue: Arc<EnvelopeQueue>,
    workers: Vec<JoinHandle<()>>,
    compactor: Option<JoinHandle<()>>,
}

impl<T> QueueingDispatcher<T>
where
    T: SinkTransport + Sync + Send + 'static,
{
    /// Open the queue `name` and start `config.workers` drain tasks.
    ///
    /// Envelopes left on disk by a previous run are dispatched first.
    #[instrument(
        name = "queueing_dispatcher_start",
        skip(dispatcher, config),
        fields(workers = config.workers)
    )]
    pub fn start(
        dispatcher: SinkDispatcher<T>,
        name: &str,
        config: &QueueConfig,
    ) -> Result<Self, IpcError> {
        let queue = Arc::new(EnvelopeQueue::open(
            name,
            QueueOptions::from(config),
            BincodeCodec::new(),
        )?);
        let dispatcher = Arc::new(dispatcher);

        let workers = (0..config.workers.max(1))
            .map(|id| {
                let dispatcher = Arc::clone(&dispatcher);
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    queue_worker(id, dispatcher, queue).await;
                })
            })
            .collect();
        let compactor = config
            .compaction_interval()
            .map(|interval| queue.spawn_compactor(interval));

        info!(
            queue = %name,
            backlog = queue.size(),
            "Queueing dispatcher started"
        );
        Ok(Self {
            dispatcher,
            queue,
            workers,
            compactor,
        })
    }

    /// Marshal `message` and park it in the queue.
    pub async fn dispatch<M: SinkModule>(
        &self,
        module: &M,
        destination: &str,
        message: &M::Message,
    ) -> Result<EnqueueResult, IpcError> {
        let envelope = self.dispatcher.envelope_for(module, destination, message)?;
        self.dispatch_envelope(envelope).await
    }

    pub async fn dispatch_envelope(&self, envelope: Envelope) -> Result<EnqueueResult, IpcError> {
        let key = envelope.routing_key.clone();
        let result = self.queue.enqueue(envelope, key).await?;
        self.dispatcher.metrics().set_queue_len(self.queue.size());
        Ok(result)
    }

    pub fn queue(&self) -> &Arc<EnvelopeQueue> {
        &self.queue
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        self.dispatcher.metrics()
    }

    /// Stop the workers; whatever is still on disk stays for the next start.
    #[instrument(name = "queueing_dispatcher_shutdown", skip(self))]
    pub async fn shutdown(self) {
        self.queue.interrupt();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(queue = %self.queue.name(), error = ?e, "Worker task panicked");
            }
        }
        if let Some(compactor) = self.compactor {
            let _ = compactor.await;
        }
        debug!(
            queue = %self.queue.name(),
            remaining = self.queue.size(),
            "Queueing dispatcher shutdown complete"
        );
    }
}

/// Drains the queue until it is interrupted
#[instrument(name = "queue_worker_loop", skip(dispatcher, queue), fields(queue = %queue.name()))]
async fn queue_worker<T>(id: usize, dispatcher: Arc<SinkDispatcher<T>>, queue: Arc<EnvelopeQueue>)
where
    T: SinkTransport + Sync + 'static,
{
    debug!(worker = id, "Queue worker started");
    let stop = queue.interrupt_token();

    loop {
        let entry = match queue.dequeue().await {
            Ok(entry) => entry,
            Err(e) if e.is_interrupted() => break,
            Err(e) => {
                error!(worker = id, error = %e, "Dequeue failed");
                tokio::time::sleep(DEQUEUE_ERROR_BACKOFF).await;
                continue;
            }
        };
        dispatcher.metrics().set_queue_len(queue.size());

        tokio::select! {
            result = dispatcher.dispatch_envelope(&entry.value) => {
                if let Err(e) = result {
                    dispatcher.metrics().inc_dropped_count();
                    observability::record_queue_dropped(queue.name());
                    error!(
                        worker = id,
                        message_id = %entry.value.id,
                        sequence = entry.sequence,
                        error = %e,
                        "Dropping queued message after fatal dispatch error"
                    );
                }
            }
            _ = stop.cancelled() => {
                warn!(
                    worker = id,
                    message_id = %entry.value.id,
                    "Shutdown interrupted an in-flight dispatch"
                );
                break;
            }
        }
    }

    debug!(worker = id, "Queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{Chunk, SendReceipt, SinkConfig, TransportFault};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Collects payloads; can be paused to force a backlog
    #[derive(Default)]
    struct RecordingTransport {
        payloads: Mutex<Vec<Vec<u8>>>,
        paused: AtomicBool,
        fail: AtomicBool,
    }

    impl SinkTransport for RecordingTransport {
        async fn send(
            &self,
            _destination: &str,
            _key: &str,
            payload: Bytes,
        ) -> Result<SendReceipt, TransportFault> {
            while self.paused.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            if self.fail.load(Ordering::Relaxed) {
                return Err(TransportFault::Other("rejected".into()));
            }
            let chunk = Chunk::decode(&payload).unwrap();
            self.payloads.lock().push(chunk.content);
            Ok(SendReceipt::in_shard(0))
        }
    }

    fn config(dir: &TempDir, workers: usize) -> QueueConfig {
        QueueConfig {
            enabled: true,
            base_dir: dir.path().to_path_buf(),
            memory_capacity: 2,
            workers,
            ..Default::default()
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_buffered_messages_are_delivered_in_order() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        transport.paused.store(true, Ordering::Relaxed);

        let sink = SinkDispatcher::new(transport.clone(), &SinkConfig::default(), "Default");
        let queueing = QueueingDispatcher::start(sink, "sink", &config(&dir, 1)).unwrap();

        let mut deferred = 0;
        for i in 0..6u8 {
            let result = queueing
                .dispatch_envelope(Envelope::new("Raw", vec![i]))
                .await
                .unwrap();
            if result == EnqueueResult::Deferred {
                deferred += 1;
            }
        }
        assert!(deferred > 0);

        transport.paused.store(false, Ordering::Relaxed);
        wait_for(|| transport.payloads.lock().len() == 6).await;

        let payloads = transport.payloads.lock().clone();
        assert_eq!(payloads, (0..6u8).map(|i| vec![i]).collect::<Vec<_>>());
        queueing.shutdown().await;
    }

    #[tokio::test]
    async fn test_fatal_errors_drop_entry_and_continue() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        transport.fail.store(true, Ordering::Relaxed);

        let sink = SinkDispatcher::new(transport.clone(), &SinkConfig::default(), "Default");
        let queueing = QueueingDispatcher::start(sink, "sink", &config(&dir, 2)).unwrap();

        queueing
            .dispatch_envelope(Envelope::new("Raw", vec![1]))
            .await
            .unwrap();
        let metrics = Arc::clone(queueing.metrics());
        wait_for(|| metrics.dropped_count() == 1).await;

        transport.fail.store(false, Ordering::Relaxed);
        queueing
            .dispatch_envelope(Envelope::new("Raw", vec![2]))
            .await
            .unwrap();
        wait_for(|| metrics.dispatched_count() == 1).await;
        assert_eq!(transport.payloads.lock().as_slice(), &[vec![2u8]]);
        queueing.shutdown().await;
    }

    #[tokio::test]
    async fn test_disk_backlog_survives_restart() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        transport.paused.store(true, Ordering::Relaxed);

        {
            let sink = SinkDispatcher::new(transport.clone(), &SinkConfig::default(), "Default");
            let queueing = QueueingDispatcher::start(sink, "sink", &config(&dir, 1)).unwrap();
            for i in 0..5u8 {
                queueing
                    .dispatch_envelope(Envelope::new("Raw", vec![i]))
                    .await
                    .unwrap();
            }
            queueing.shutdown().await;
        }

        transport.paused.store(false, Ordering::Relaxed);
        let sink = SinkDispatcher::new(transport.clone(), &SinkConfig::default(), "Default");
        let queueing = QueueingDispatcher::start(sink, "sink", &config(&dir, 1)).unwrap();

        // The first worker held one entry in flight and the ring held two more;
        // the rest came back from disk
        wait_for(|| transport.payloads.lock().last() == Some(&vec![4u8])).await;
        assert!(queueing.queue().is_empty());
        queueing.shutdown().await;
    }
}
