//! InMemoryBroker - partitioned topics and RPC routing inside one process

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, trace, warn};

use contracts::{
    Envelope, RpcCallback, RpcModule, RpcTransport, SendReceipt, SinkTransport, TransportFault,
};

use crate::rpc::{ModuleHandler, RpcHandler};

/// One message accepted on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub key: String,
    pub payload: Bytes,
}

struct Topic {
    log: Vec<Delivery>,
    partitions: Vec<(async_channel::Sender<Bytes>, async_channel::Receiver<Bytes>)>,
}

impl Topic {
    fn new(partitions: usize) -> Self {
        Self {
            log: Vec::new(),
            partitions: (0..partitions).map(|_| async_channel::unbounded()).collect(),
        }
    }
}

struct Listener {
    system_id: Option<String>,
    handler: Arc<dyn RpcHandler>,
}

enum Route {
    Deliver(Arc<dyn RpcHandler>),
    /// A listener exists at the location, but not for the requested system
    Unclaimed,
    NoConsumer,
}

#[derive(Default)]
struct Faults {
    /// Returned by upcoming sink sends, in order
    send_faults: VecDeque<TransportFault>,
    /// Partitions reported by upcoming sink sends, in order
    forced_partitions: VecDeque<i32>,
    /// How long `async_send` blocks before returning
    rpc_send_stall: Option<Duration>,
}

struct Inner {
    partitions: usize,
    topics: Mutex<HashMap<String, Topic>>,
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
    faults: Mutex<Faults>,
    report_partitions: AtomicBool,
    drop_replies: AtomicBool,
    stopped: AtomicBool,
    runtime: Option<Handle>,
}

/// In-process broker implementing [`SinkTransport`] and [`RpcTransport`].
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("partitions", &self.inner.partitions)
            .field("topics", &self.inner.topics.lock().len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(4)
    }
}

impl InMemoryBroker {
    /// Create a broker with `partitions` partitions per topic.
    ///
    /// RPC replies run on the tokio runtime current at construction, or on
    /// the caller's runtime if there was none.
    pub fn new(partitions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                topics: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                report_partitions: AtomicBool::new(true),
                drop_replies: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    pub fn partitions(&self) -> usize {
        self.inner.partitions
    }

    // ===== Sink side =====

    /// Partition a key hashes to
    pub fn partition_for(&self, key: &str) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.inner.partitions as u64) as i32
    }

    /// Receiver for one partition of `topic`
    pub fn subscribe(&self, topic: &str, partition: i32) -> Option<async_channel::Receiver<Bytes>> {
        let mut topics = self.inner.topics.lock();
        let topic = topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(self.inner.partitions));
        usize::try_from(partition)
            .ok()
            .and_then(|p| topic.partitions.get(p))
            .map(|(_, rx)| rx.clone())
    }

    /// Everything accepted on `topic`, in acceptance order
    pub fn deliveries(&self, topic: &str) -> Vec<Delivery> {
        self.inner
            .topics
            .lock()
            .get(topic)
            .map(|t| t.log.clone())
            .unwrap_or_default()
    }

    /// Make the next sink sends fail with `faults`, in order
    pub fn inject_send_faults(&self, faults: impl IntoIterator<Item = TransportFault>) {
        self.inner.faults.lock().send_faults.extend(faults);
    }

    /// Route the next sink sends to `partitions`, in order, ignoring the key
    pub fn force_partitions(&self, partitions: impl IntoIterator<Item = i32>) {
        self.inner
            .faults
            .lock()
            .forced_partitions
            .extend(partitions);
    }

    /// Whether receipts carry the partition
    pub fn set_report_partitions(&self, report: bool) {
        self.inner.report_partitions.store(report, Ordering::Relaxed);
    }

    // ===== RPC side =====

    /// Serve `module` for requests addressed to `location`.
    ///
    /// With a `system_id`, requests naming another system at the same
    /// location are not picked up.
    #[instrument(name = "broker_bind_rpc", skip(self, module), fields(module = %module.id()))]
    pub fn bind_rpc<M: RpcModule>(&self, module: Arc<M>, location: &str, system_id: Option<&str>) {
        let listener = Listener {
            system_id: system_id.map(str::to_string),
            handler: Arc::new(ModuleHandler::new(module)),
        };
        self.inner
            .listeners
            .lock()
            .entry(location.to_string())
            .or_default()
            .push(listener);
        info!("RPC listener bound");
    }

    /// Remove every listener at `location`
    pub fn unbind_location(&self, location: &str) {
        self.inner.listeners.lock().remove(location);
    }

    /// Make `async_send` block for `stall` before returning
    pub fn stall_rpc_sends(&self, stall: Option<Duration>) {
        self.inner.faults.lock().rpc_send_stall = stall;
    }

    /// Accept RPC sends but never invoke their callbacks
    pub fn drop_replies(&self, drop: bool) {
        self.inner.drop_replies.store(drop, Ordering::Relaxed);
    }

    // ===== Lifecycle =====

    /// Refuse all further sends
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            info!("Broker stopped");
        }
    }

    pub fn start(&self) {
        self.inner.stopped.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    fn route(&self, envelope: &Envelope) -> Route {
        let Some(location) = envelope.destination_location.as_deref() else {
            return Route::NoConsumer;
        };
        let listeners = self.inner.listeners.lock();
        let Some(bound) = listeners.get(location).filter(|l| !l.is_empty()) else {
            return Route::NoConsumer;
        };
        bound
            .iter()
            .find(|l| match (&envelope.system_id, &l.system_id) {
                (None, _) => true,
                (Some(wanted), Some(bound)) => wanted == bound,
                (Some(_), None) => false,
            })
            .map(|l| Route::Deliver(Arc::clone(&l.handler)))
            .unwrap_or(Route::Unclaimed)
    }
}

impl SinkTransport for InMemoryBroker {
    async fn send(
        &self,
        destination: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<SendReceipt, TransportFault> {
        if self.is_stopped() {
            return Err(TransportFault::Unavailable("broker stopped".into()));
        }

        let forced = {
            let mut faults = self.inner.faults.lock();
            if let Some(fault) = faults.send_faults.pop_front() {
                debug!(destination, error = %fault, "Injected send fault");
                return Err(fault);
            }
            faults.forced_partitions.pop_front()
        };
        let partition = forced.unwrap_or_else(|| self.partition_for(key));

        {
            let mut topics = self.inner.topics.lock();
            let topic = topics
                .entry(destination.to_string())
                .or_insert_with(|| Topic::new(self.inner.partitions));
            let index = partition.rem_euclid(self.inner.partitions as i32) as usize;
            // Unbounded channel; only fails once every receiver is gone
            let _ = topic.partitions[index].0.try_send(payload.clone());
            topic.log.push(Delivery {
                partition,
                key: key.to_string(),
                payload,
            });
        }
        trace!(destination, key, partition, "Message accepted");

        let shard = self
            .inner
            .report_partitions
            .load(Ordering::Relaxed)
            .then_some(partition);
        Ok(SendReceipt { shard })
    }
}

impl RpcTransport for InMemoryBroker {
    fn async_send(
        &self,
        envelope: Envelope,
        timeout: Duration,
        on_complete: RpcCallback,
    ) -> Result<(), TransportFault> {
        let stall = self.inner.faults.lock().rpc_send_stall;
        if let Some(stall) = stall {
            // Misbehaving client library: blocks the calling thread
            std::thread::sleep(stall);
        }
        if self.is_stopped() {
            return Err(TransportFault::Unavailable("broker stopped".into()));
        }

        let runtime = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or_else(|| TransportFault::Unavailable("no runtime to deliver replies".into()))?;

        if self.inner.drop_replies.load(Ordering::Relaxed) {
            debug!(message_id = %envelope.id, "Dropping reply callback");
            drop(on_complete);
            return Ok(());
        }

        let route = self.route(&envelope);
        let message_id = envelope.id.clone();
        let location = envelope.destination_location.clone().unwrap_or_default();
        let payload = envelope.payload;

        runtime.spawn(async move {
            let result = match route {
                Route::Deliver(handler) => {
                    match tokio::time::timeout(timeout, handler.handle(payload)).await {
                        Ok(reply) => reply,
                        Err(_) => Err(TransportFault::Timeout(format!(
                            "no reply from {} within {timeout:?}",
                            handler.module_id()
                        ))),
                    }
                }
                Route::Unclaimed => {
                    tokio::time::sleep(timeout).await;
                    Err(TransportFault::Timeout(format!(
                        "request not picked up at {location} within {timeout:?}"
                    )))
                }
                Route::NoConsumer => {
                    warn!(message_id = %message_id, location = %location, "No RPC consumer");
                    Err(TransportFault::NoConsumer(format!(
                        "no listener at location '{location}'"
                    )))
                }
            };
            on_complete(result);
        });
        Ok(())
    }
}
