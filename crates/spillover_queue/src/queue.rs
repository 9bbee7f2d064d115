//! SpilloverQueue - memory ring in front of a disk log.
//!
//! Placement rule: an entry goes to the ring only while the disk tier is
//! empty. Every ring entry is therefore older than every disk entry, and
//! serving the ring first keeps the queue globally FIFO.

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use contracts::QueueConfig;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::log::{DiskLog, Recovery};
use crate::{QueueCodec, QueueError};

/// Where an accepted entry was placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// In the memory ring
    Immediate,
    /// Appended to the disk log
    Deferred,
}

/// Tier an entry was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Memory,
    Disk,
}

impl Residency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Disk => "disk",
        }
    }
}

/// A dequeued entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry<T> {
    pub sequence: u64,
    pub key: String,
    pub value: T,
    pub residency: Residency,
}

/// Sizing and location of a queue
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub base_dir: PathBuf,
    pub memory_capacity: usize,
    pub disk_capacity_bytes: u64,
}

impl QueueOptions {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let defaults = QueueConfig::default();
        Self {
            base_dir: base_dir.into(),
            memory_capacity: defaults.memory_capacity,
            disk_capacity_bytes: defaults.disk_capacity_bytes,
        }
    }

    pub fn memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = capacity;
        self
    }

    pub fn disk_capacity_bytes(mut self, capacity: u64) -> Self {
        self.disk_capacity_bytes = capacity;
        self
    }

    /// Path of the log file for `name`
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.fifo"))
    }
}

impl From<&QueueConfig> for QueueOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            memory_capacity: config.memory_capacity,
            disk_capacity_bytes: config.disk_capacity_bytes,
        }
    }
}

struct Tiers<T> {
    memory: HeapRb<QueueEntry<T>>,
    disk: DiskLog,
    next_sequence: u64,
}

impl<T> Tiers<T> {
    fn accepts_in_memory(&self) -> bool {
        self.disk.is_empty() && !self.memory.is_full()
    }

    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

/// Bounded hybrid FIFO.
///
/// Share it behind an [`Arc`]; every method takes `&self`.
pub struct SpilloverQueue<T, C> {
    name: String,
    codec: C,
    tiers: Mutex<Tiers<T>>,
    not_empty: Notify,
    not_full: Notify,
    interrupt: CancellationToken,
}

impl<T, C> std::fmt::Debug for SpilloverQueue<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tiers = self.tiers.lock();
        f.debug_struct("SpilloverQueue")
            .field("name", &self.name)
            .field("memory", &tiers.memory.occupied_len())
            .field("disk", &tiers.disk.len())
            .finish()
    }
}

impl<T, C> SpilloverQueue<T, C>
where
    T: Send,
    C: QueueCodec<T>,
{
    /// Open the queue `name`, reusing `{base_dir}/{name}.fifo` if present.
    ///
    /// Entries left on disk by a previous owner are served first. A corrupt
    /// file is moved aside and the queue starts empty.
    #[instrument(name = "queue_open", skip(options, codec), fields(queue = %name))]
    pub fn open(name: &str, options: QueueOptions, codec: C) -> Result<Self, QueueError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(QueueError::InvalidOptions(format!(
                "invalid queue name '{name}'"
            )));
        }
        if options.memory_capacity == 0 {
            return Err(QueueError::InvalidOptions(
                "memory capacity must be at least 1".into(),
            ));
        }

        let path = options.file_path(name);
        let (disk, recovery) = DiskLog::open(&path, options.disk_capacity_bytes)?;
        match &recovery {
            Recovery::Clean if !disk.is_empty() => {
                info!(path = %path.display(), entries = disk.len(), "Resuming queue from disk");
            }
            Recovery::Clean | Recovery::Created => {
                debug!(path = %path.display(), "Queue opened");
            }
            Recovery::TruncatedTail { dropped_bytes } => {
                warn!(
                    path = %path.display(),
                    dropped_bytes,
                    entries = disk.len(),
                    "Truncated torn record at end of queue file"
                );
            }
            Recovery::Quarantined { reason, moved_to } => {
                warn!(
                    path = %path.display(),
                    moved_to = %moved_to.display(),
                    reason = %reason,
                    "Queue file corrupt, starting empty"
                );
            }
        }

        let next_sequence = disk.last_sequence().map_or(0, |s| s + 1);
        let queue = Self {
            name: name.to_string(),
            codec,
            tiers: Mutex::new(Tiers {
                memory: HeapRb::new(options.memory_capacity),
                disk,
                next_sequence,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            interrupt: CancellationToken::new(),
        };
        queue.report_depth();
        Ok(queue)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an entry, waiting while the disk tier is full.
    pub async fn enqueue(
        &self,
        value: T,
        key: impl Into<String>,
    ) -> Result<EnqueueResult, QueueError> {
        self.enqueue_inner(value, key.into(), None).await
    }

    /// [`enqueue`](Self::enqueue) that also gives up when `token` fires.
    pub async fn enqueue_cancellable(
        &self,
        value: T,
        key: impl Into<String>,
        token: &CancellationToken,
    ) -> Result<EnqueueResult, QueueError> {
        self.enqueue_inner(value, key.into(), Some(token)).await
    }

    async fn enqueue_inner(
        &self,
        value: T,
        key: String,
        token: Option<&CancellationToken>,
    ) -> Result<EnqueueResult, QueueError> {
        let mut encoded: Option<Vec<u8>> = None;
        loop {
            if self.interrupt.is_cancelled() || token.is_some_and(|t| t.is_cancelled()) {
                return Err(QueueError::interrupted(&self.name));
            }

            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut tiers = self.tiers.lock();
                if tiers.accepts_in_memory() {
                    let sequence = tiers.take_sequence();
                    let entry = QueueEntry {
                        sequence,
                        key,
                        value,
                        residency: Residency::Memory,
                    };
                    // Cannot fail: the ring was checked for room under the same lock
                    let _ = tiers.memory.try_push(entry);
                    drop(tiers);
                    self.accepted(Residency::Memory);
                    return Ok(EnqueueResult::Immediate);
                }

                if let Some(bytes) = encoded.as_deref() {
                    let record_len = DiskLog::record_len(key.len(), bytes.len());
                    if !tiers.disk.could_ever_fit(record_len) {
                        return Err(QueueError::EntryTooLarge {
                            queue: self.name.clone(),
                            size: record_len,
                            capacity: tiers.disk.capacity(),
                        });
                    }
                    if tiers.disk.has_room(record_len) {
                        let sequence = tiers.take_sequence();
                        tiers
                            .disk
                            .append(sequence, &key, bytes)
                            .map_err(|e| QueueError::write_failed(&self.name, e))?;
                        drop(tiers);
                        self.accepted(Residency::Disk);
                        return Ok(EnqueueResult::Deferred);
                    }
                }
            }

            if encoded.is_none() {
                encoded = Some(self.codec.encode(&value)?);
                continue;
            }

            debug!(queue = %self.name, "Disk tier full, waiting for space");
            tokio::select! {
                _ = &mut notified => {}
                _ = self.interrupt.cancelled() => return Err(QueueError::interrupted(&self.name)),
                _ = cancelled(token) => return Err(QueueError::interrupted(&self.name)),
            }
        }
    }

    /// Remove the oldest entry, waiting while the queue is empty.
    pub async fn dequeue(&self) -> Result<QueueEntry<T>, QueueError> {
        self.dequeue_inner(None).await
    }

    /// [`dequeue`](Self::dequeue) that also gives up when `token` fires.
    pub async fn dequeue_cancellable(
        &self,
        token: &CancellationToken,
    ) -> Result<QueueEntry<T>, QueueError> {
        self.dequeue_inner(Some(token)).await
    }

    async fn dequeue_inner(
        &self,
        token: Option<&CancellationToken>,
    ) -> Result<QueueEntry<T>, QueueError> {
        loop {
            if self.interrupt.is_cancelled() || token.is_some_and(|t| t.is_cancelled()) {
                return Err(QueueError::interrupted(&self.name));
            }

            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.try_dequeue()? {
                return Ok(entry);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.interrupt.cancelled() => return Err(QueueError::interrupted(&self.name)),
                _ = cancelled(token) => return Err(QueueError::interrupted(&self.name)),
            }
        }
    }

    /// Remove the oldest entry if there is one.
    pub fn try_dequeue(&self) -> Result<Option<QueueEntry<T>>, QueueError> {
        let mut tiers = self.tiers.lock();

        if let Some(entry) = tiers.memory.try_pop() {
            drop(tiers);
            self.released();
            return Ok(Some(entry));
        }

        while let Some(record) = tiers.disk.pop_front()? {
            match self.codec.decode(&record.value) {
                Ok(value) => {
                    drop(tiers);
                    self.released();
                    return Ok(Some(QueueEntry {
                        sequence: record.sequence,
                        key: record.key,
                        value,
                        residency: Residency::Disk,
                    }));
                }
                Err(e) => {
                    error!(
                        queue = %self.name,
                        sequence = record.sequence,
                        key = %record.key,
                        error = %e,
                        "Dropping undecodable queue entry"
                    );
                }
            }
        }
        Ok(None)
    }

    /// Total number of entries in both tiers
    pub fn size(&self) -> usize {
        let tiers = self.tiers.lock();
        tiers.memory.occupied_len() + tiers.disk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn memory_len(&self) -> usize {
        self.tiers.lock().memory.occupied_len()
    }

    pub fn disk_len(&self) -> usize {
        self.tiers.lock().disk.len()
    }

    /// Live bytes in the disk tier, header included
    pub fn disk_bytes(&self) -> u64 {
        self.tiers.lock().disk.live_bytes()
    }

    /// Physical size of the log file
    pub fn file_bytes(&self) -> u64 {
        self.tiers.lock().disk.file_bytes()
    }

    pub fn file_path(&self) -> PathBuf {
        self.tiers.lock().disk.path().to_path_buf()
    }

    /// Compact the consumed prefix of the disk log and wake blocked producers.
    ///
    /// Returns the number of bytes reclaimed. Blocks on file I/O; from async
    /// code run it through `spawn_blocking` as the compactor does.
    pub fn check_file_size(&self) -> Result<u64, QueueError> {
        let reclaimed = {
            let mut tiers = self.tiers.lock();
            tiers.disk.compact()?
        };
        if reclaimed > 0 {
            debug!(queue = %self.name, reclaimed, "Compacted queue file");
            self.not_full.notify_waiters();
        }
        Ok(reclaimed)
    }

    /// Abort every blocked and future blocking call with `Interrupted`.
    ///
    /// Queued data is untouched; `try_dequeue` keeps working.
    pub fn interrupt(&self) {
        self.interrupt.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Token cancelled by [`interrupt`](Self::interrupt)
    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    fn accepted(&self, residency: Residency) {
        self.not_empty.notify_waiters();
        observability::metrics::record_queue_enqueued(&self.name, residency.as_str());
        self.report_depth();
    }

    fn released(&self) {
        self.not_full.notify_waiters();
        self.report_depth();
    }

    fn report_depth(&self) {
        let (memory, disk) = {
            let tiers = self.tiers.lock();
            (tiers.memory.occupied_len(), tiers.disk.len())
        };
        observability::metrics::record_queue_depth(&self.name, memory, disk);
    }
}

impl<T, C> SpilloverQueue<T, C>
where
    T: Send + 'static,
    C: QueueCodec<T> + 'static,
{
    /// Compact the log every `interval` until the queue is interrupted or dropped.
    pub fn spawn_compactor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let stop = self.interrupt.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(queue) = weak.upgrade() else {
                    break;
                };
                // Compaction copies the live records; keep it off the async workers
                match tokio::task::spawn_blocking(move || queue.check_file_size()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(queue = %name, error = %e, "Periodic compaction failed"),
                    Err(e) => warn!(queue = %name, error = %e, "Compaction task failed"),
                }
            }
            debug!(queue = %name, "Compactor stopped");
        })
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RawCodec, Utf8Codec};
    use std::fs;
    use tempfile::TempDir;

    fn options(dir: &TempDir, memory: usize, disk: u64) -> QueueOptions {
        QueueOptions::new(dir.path())
            .memory_capacity(memory)
            .disk_capacity_bytes(disk)
    }

    fn open_strings(dir: &TempDir, memory: usize, disk: u64) -> SpilloverQueue<String, Utf8Codec> {
        SpilloverQueue::open("test", options(dir, memory, disk), Utf8Codec).unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_and_dequeue() {
        let dir = TempDir::new().unwrap();
        let queue = open_strings(&dir, 10, 1024 * 1024);

        let result = queue.enqueue("a".to_string(), "key").await.unwrap();
        assert_eq!(result, EnqueueResult::Immediate);
        assert_eq!(queue.size(), 1);

        let entry = queue.dequeue().await.unwrap();
        assert_eq!(entry.value, "a");
        assert_eq!(entry.key, "key");
        assert_eq!(entry.residency, Residency::Memory);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_fifo_across_tiers() {
        let dir = TempDir::new().unwrap();
        let queue = open_strings(&dir, 3, 1024 * 1024);

        for i in 0..10 {
            queue.enqueue(format!("msg{i}"), "k").await.unwrap();
        }
        assert_eq!(queue.memory_len(), 3);
        assert_eq!(queue.disk_len(), 7);
        assert_eq!(queue.size(), queue.memory_len() + queue.disk_len());

        // Draining part of the ring must not let new entries jump the disk backlog
        assert_eq!(queue.dequeue().await.unwrap().value, "msg0");
        assert_eq!(
            queue.enqueue("msg10".to_string(), "k").await.unwrap(),
            EnqueueResult::Deferred
        );

        let mut seen = Vec::new();
        while let Some(entry) = queue.try_dequeue().unwrap() {
            seen.push(entry.value);
        }
        let expected: Vec<String> = (1..=10).map(|i| format!("msg{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_sequences_increase_across_restart() {
        let dir = TempDir::new().unwrap();
        {
            let queue = open_strings(&dir, 1, 1024 * 1024);
            queue.enqueue("a".to_string(), "k").await.unwrap();
            queue.enqueue("b".to_string(), "k").await.unwrap();
        }
        let queue = open_strings(&dir, 1, 1024 * 1024);
        let b = queue.dequeue().await.unwrap();
        queue.enqueue("c".to_string(), "k").await.unwrap();
        let c = queue.dequeue().await.unwrap();
        assert!(c.sequence > b.sequence);
    }

    #[tokio::test]
    async fn test_restart_keeps_disk_entries_only() {
        let dir = TempDir::new().unwrap();
        {
            let queue = open_strings(&dir, 1, 1024 * 1024);
            assert_eq!(
                queue.enqueue("msg1".to_string(), "k").await.unwrap(),
                EnqueueResult::Immediate
            );
            assert_eq!(
                queue.enqueue("msg2".to_string(), "k").await.unwrap(),
                EnqueueResult::Deferred
            );
        }

        let queue = open_strings(&dir, 1, 1024 * 1024);
        assert_eq!(queue.size(), 1);
        let entry = queue.dequeue().await.unwrap();
        assert_eq!(entry.value, "msg2");
        assert_eq!(entry.residency, Residency::Disk);
    }

    #[tokio::test]
    async fn test_corrupt_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(options(&dir, 1, 1024).file_path("test"), b"corrupt!").unwrap();

        let queue = open_strings(&dir, 1, 1024 * 1024);
        assert_eq!(queue.size(), 0);

        queue.enqueue("a".to_string(), "k").await.unwrap();
        queue.enqueue("b".to_string(), "k").await.unwrap();
        assert_eq!(queue.dequeue().await.unwrap().value, "a");
        assert_eq!(queue.dequeue().await.unwrap().value, "b");

        let quarantined = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".corrupt"))
            .count();
        assert_eq!(quarantined, 1);
    }

    #[tokio::test]
    async fn test_blocks_when_empty() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(open_strings(&dir, 4, 1024 * 1024));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!consumer.is_finished());

        queue.enqueue("late".to_string(), "k").await.unwrap();
        let entry = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(entry.value, "late");
    }

    #[tokio::test]
    async fn test_blocks_when_disk_full() {
        let dir = TempDir::new().unwrap();
        // Header (32) plus room for exactly two 10-byte entries with 1-byte keys
        let record = DiskLog::record_len(1, 10);
        let queue = Arc::new(open_strings(&dir, 1, 32 + 2 * record));

        queue.enqueue("0000000000".to_string(), "k").await.unwrap();
        assert_eq!(
            queue.enqueue("1111111111".to_string(), "k").await.unwrap(),
            EnqueueResult::Deferred
        );
        queue.enqueue("2222222222".to_string(), "k").await.unwrap();
        assert_eq!(queue.disk_bytes(), 32 + 2 * record);

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue("3333333333".to_string(), "k").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        // Freeing the ring does not help: disk still has a backlog
        assert_eq!(queue.dequeue().await.unwrap().value, "0000000000");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.dequeue().await.unwrap().value, "1111111111");
        let result = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(result, EnqueueResult::Deferred);

        assert_eq!(queue.dequeue().await.unwrap().value, "2222222222");
        assert_eq!(queue.dequeue().await.unwrap().value, "3333333333");
    }

    #[tokio::test]
    async fn test_oversized_entry_fails_fast() {
        let dir = TempDir::new().unwrap();
        let queue: SpilloverQueue<Vec<u8>, RawCodec> =
            SpilloverQueue::open("raw", options(&dir, 1, 128), RawCodec).unwrap();

        queue.enqueue(vec![1], "k").await.unwrap();
        let err = queue.enqueue(vec![0u8; 512], "k").await.unwrap_err();
        assert!(matches!(err, QueueError::EntryTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_interrupt_wakes_blocked_dequeue() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(open_strings(&dir, 4, 1024 * 1024));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.interrupt();

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(QueueError::Interrupted { .. })));
    }

    #[tokio::test]
    async fn test_cancellable_dequeue_keeps_data() {
        let dir = TempDir::new().unwrap();
        let queue = open_strings(&dir, 4, 1024 * 1024);
        let token = CancellationToken::new();
        token.cancel();

        let err = queue.dequeue_cancellable(&token).await.unwrap_err();
        assert!(err.is_interrupted());

        queue.enqueue("kept".to_string(), "k").await.unwrap();
        assert_eq!(queue.dequeue().await.unwrap().value, "kept");
    }

    #[tokio::test]
    async fn test_second_open_is_locked() {
        let dir = TempDir::new().unwrap();
        let _first = open_strings(&dir, 1, 1024);
        let second: Result<SpilloverQueue<String, Utf8Codec>, _> =
            SpilloverQueue::open("test", options(&dir, 1, 1024), Utf8Codec);
        assert!(matches!(second, Err(QueueError::Locked { .. })));
    }

    #[tokio::test]
    async fn test_check_file_size_reclaims_space() {
        let dir = TempDir::new().unwrap();
        let queue = open_strings(&dir, 1, 1024 * 1024);
        for i in 0..5 {
            queue.enqueue(format!("entry-{i}"), "k").await.unwrap();
        }
        queue.dequeue().await.unwrap();
        queue.dequeue().await.unwrap();
        queue.dequeue().await.unwrap();

        let before = queue.file_bytes();
        let reclaimed = queue.check_file_size().unwrap();
        assert!(reclaimed > 0);
        assert_eq!(queue.file_bytes(), before - reclaimed);
        assert_eq!(queue.file_bytes(), queue.disk_bytes());
        assert_eq!(queue.dequeue().await.unwrap().value, "entry-3");
    }

    #[tokio::test]
    async fn test_file_bounded_without_compactor() {
        let dir = TempDir::new().unwrap();
        let capacity = 156;
        let queue = open_strings(&dir, 1, capacity);

        queue.enqueue("parked-000".to_string(), "k").await.unwrap();
        queue.enqueue("parked-001".to_string(), "k").await.unwrap();
        for i in 2..1000 {
            queue.enqueue(format!("entry-{i:04}"), "k").await.unwrap();
            queue.dequeue().await.unwrap();
            assert!(queue.file_bytes() <= capacity, "file grew to {}", queue.file_bytes());
        }
        assert_eq!(queue.size(), 2);
        assert_eq!(queue.dequeue().await.unwrap().value, "entry-0998");
    }

    #[tokio::test]
    async fn test_compactor_reclaims_consumed_prefix() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(open_strings(&dir, 1, 1024 * 1024));
        for i in 0..6 {
            queue.enqueue(format!("entry-{i}"), "k").await.unwrap();
        }
        for _ in 0..3 {
            queue.dequeue().await.unwrap();
        }
        assert!(queue.file_bytes() > queue.disk_bytes());

        let compactor = queue.spawn_compactor(Duration::from_millis(10));
        for _ in 0..200 {
            if queue.file_bytes() == queue.disk_bytes() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.file_bytes(), queue.disk_bytes());

        queue.interrupt();
        compactor.await.unwrap();
        assert_eq!(queue.try_dequeue().unwrap().unwrap().value, "entry-3");
    }

    #[tokio::test]
    async fn test_parallel_producers_and_consumers() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(open_strings(&dir, 8, 1024 * 1024));

        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..100 {
                    queue.enqueue(format!("{p}-{i}"), "k").await.unwrap();
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(async move {
                let mut got = Vec::new();
                for _ in 0..100 {
                    got.push(queue.dequeue().await.unwrap().value);
                }
                got
            }));
        }

        for producer in producers {
            producer.await.unwrap();
        }
        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        for name in ["", "../escape", ".hidden"] {
            let result: Result<SpilloverQueue<String, Utf8Codec>, _> =
                SpilloverQueue::open(name, options(&dir, 1, 1024), Utf8Codec);
            assert!(matches!(result, Err(QueueError::InvalidOptions(_))));
        }
    }
}
