//! Append-only record log backing the disk tier.
//!
//! File layout:
//!
//! ```text
//! header (32 bytes): magic "IPCQ" | u32 version | u64 head | u32 crc32(header[0..16]) | padding
//! record:            u32 body_len | u32 crc32(body) | body
//! body:              u64 sequence | u32 key_len | key | value
//! ```
//!
//! `head` is the offset of the oldest live record; everything before it has
//! been consumed and is reclaimed by [`DiskLog::compact`]. All integers are
//! little-endian.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use tracing::warn;

use crate::QueueError;

pub(crate) const HEADER_LEN: u64 = 32;
const MAGIC: &[u8; 4] = b"IPCQ";
const VERSION: u32 = 1;
const RECORD_PREFIX: u64 = 8;
const BODY_FIXED: u64 = 12;
const MAX_RECORD_BODY: u64 = 1 << 30;
/// Consumed prefix that triggers compaction from `pop_front`
const AUTO_COMPACT_MIN_BYTES: u64 = 1 << 20;

/// Location of a live record in the file
#[derive(Debug, Clone, Copy)]
struct RecordPos {
    offset: u64,
    len: u64,
    sequence: u64,
}

/// One decoded record
#[derive(Debug)]
pub(crate) struct DiskRecord {
    pub sequence: u64,
    pub key: String,
    pub value: Vec<u8>,
}

/// What `open` had to do to get a usable log
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recovery {
    Clean,
    Created,
    TruncatedTail { dropped_bytes: u64 },
    Quarantined { reason: String, moved_to: PathBuf },
}

enum ScanError {
    Io(io::Error),
    Corrupt(String),
}

impl From<io::Error> for ScanError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

struct ScanOutcome {
    head: u64,
    records: VecDeque<RecordPos>,
    valid_end: u64,
    file_len: u64,
}

pub(crate) struct DiskLog {
    path: PathBuf,
    file: File,
    head: u64,
    tail: u64,
    index: VecDeque<RecordPos>,
    capacity: u64,
}

impl std::fmt::Debug for DiskLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskLog")
            .field("path", &self.path)
            .field("records", &self.index.len())
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl DiskLog {
    /// Open (or create) the log at `path` and take the exclusive lock.
    ///
    /// A torn final record is truncated. Anything else that fails the integrity
    /// check moves the file aside and starts an empty log.
    pub(crate) fn open(path: &Path, capacity: u64) -> Result<(Self, Recovery), QueueError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = open_locked(path)?;

        if file.metadata()?.len() == 0 {
            let log = Self::fresh(path, file, capacity)?;
            return Ok((log, Recovery::Created));
        }

        match scan(&file) {
            Ok(outcome) => {
                let mut recovery = Recovery::Clean;
                if outcome.valid_end < outcome.file_len {
                    file.set_len(outcome.valid_end)?;
                    recovery = Recovery::TruncatedTail {
                        dropped_bytes: outcome.file_len - outcome.valid_end,
                    };
                }
                let log = Self {
                    path: path.to_path_buf(),
                    file,
                    head: outcome.head,
                    tail: outcome.valid_end,
                    index: outcome.records,
                    capacity,
                };
                Ok((log, recovery))
            }
            Err(ScanError::Io(e)) => Err(e.into()),
            Err(ScanError::Corrupt(reason)) => {
                let moved_to = quarantine_path(path);
                // Unlock before the rename so the fresh file can be locked
                drop(file);
                fs::rename(path, &moved_to)?;
                let file = open_locked(path)?;
                let log = Self::fresh(path, file, capacity)?;
                Ok((log, Recovery::Quarantined { reason, moved_to }))
            }
        }
    }

    fn fresh(path: &Path, mut file: File, capacity: u64) -> io::Result<Self> {
        file.set_len(0)?;
        write_header(&mut file, HEADER_LEN)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            head: HEADER_LEN,
            tail: HEADER_LEN,
            index: VecDeque::new(),
            capacity,
        })
    }

    /// On-disk size of a record with the given key and value lengths
    pub(crate) fn record_len(key_len: usize, value_len: usize) -> u64 {
        RECORD_PREFIX + BODY_FIXED + key_len as u64 + value_len as u64
    }

    /// Whether a record of `record_len` bytes fits right now
    pub(crate) fn has_room(&self, record_len: u64) -> bool {
        self.live_bytes() + record_len <= self.capacity
    }

    /// Whether a record of `record_len` bytes fits into an empty log
    pub(crate) fn could_ever_fit(&self, record_len: u64) -> bool {
        HEADER_LEN + record_len <= self.capacity
            && record_len - RECORD_PREFIX <= MAX_RECORD_BODY
    }

    pub(crate) fn append(&mut self, sequence: u64, key: &str, value: &[u8]) -> io::Result<()> {
        let record_len = Self::record_len(key.len(), value.len());
        let body_len = record_len - RECORD_PREFIX;
        if body_len > MAX_RECORD_BODY {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("record body of {body_len} bytes is too large"),
            ));
        }

        let mut buf = Vec::with_capacity(record_len as usize);
        buf.extend_from_slice(&[0u8; RECORD_PREFIX as usize]);
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(value);
        let crc = crc32fast::hash(&buf[RECORD_PREFIX as usize..]);
        buf[0..4].copy_from_slice(&(body_len as u32).to_le_bytes());
        buf[4..8].copy_from_slice(&crc.to_le_bytes());

        // Keep the physical file within capacity, not just the live bytes
        if self.tail + record_len > self.capacity && self.head > HEADER_LEN {
            if let Err(e) = self.compact() {
                warn!(path = %self.path.display(), error = %e, "Queue file compaction failed");
            }
        }

        self.file.seek(SeekFrom::Start(self.tail))?;
        if let Err(e) = self.file.write_all(&buf) {
            // Do not leave a partial record behind for the next append
            let _ = self.file.set_len(self.tail);
            return Err(e);
        }

        self.index.push_back(RecordPos {
            offset: self.tail,
            len: record_len,
            sequence,
        });
        self.tail += record_len;
        Ok(())
    }

    /// Remove and return the oldest record.
    ///
    /// The header is moved past the record before the record leaves the
    /// index, so a failed header write keeps it for the next call. Records
    /// that fail their checksum here were damaged after open; they are
    /// dropped with a warning.
    pub(crate) fn pop_front(&mut self) -> io::Result<Option<DiskRecord>> {
        while let Some(pos) = self.index.front().copied() {
            let mut buf = vec![0u8; pos.len as usize];
            self.file.seek(SeekFrom::Start(pos.offset))?;
            self.file.read_exact(&mut buf)?;

            if self.index.len() == 1 {
                self.reset()?;
            } else {
                let head = pos.offset + pos.len;
                write_header(&mut self.file, head)?;
                self.head = head;
            }
            self.index.pop_front();
            self.maybe_compact();

            match decode_record(&buf) {
                Ok(record) => return Ok(Some(record)),
                Err(reason) => warn!(
                    path = %self.path.display(),
                    offset = pos.offset,
                    sequence = pos.sequence,
                    reason = %reason,
                    "Dropping damaged queue record"
                ),
            }
        }
        Ok(None)
    }

    /// Compact once the consumed prefix is both large and bigger than the
    /// live records.
    fn maybe_compact(&mut self) {
        let consumed = self.head - HEADER_LEN;
        if consumed < AUTO_COMPACT_MIN_BYTES || consumed <= self.tail - self.head {
            return;
        }
        if let Err(e) = self.compact() {
            warn!(path = %self.path.display(), consumed, error = %e, "Queue file compaction failed");
        }
    }

    /// Rewrite the live records to the front of the file.
    ///
    /// Returns the number of bytes reclaimed.
    pub(crate) fn compact(&mut self) -> io::Result<u64> {
        let reclaimed = self.head - HEADER_LEN;
        if reclaimed == 0 {
            return Ok(0);
        }
        if self.index.is_empty() {
            self.reset()?;
            return Ok(reclaimed);
        }

        let tmp = self.path.with_extension("fifo.compact");
        let result = self.rewrite_into(&tmp);
        let file = match result {
            Ok(file) => file,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        self.file = file;
        for pos in self.index.iter_mut() {
            pos.offset -= reclaimed;
        }
        self.head = HEADER_LEN;
        self.tail -= reclaimed;
        Ok(reclaimed)
    }

    fn rewrite_into(&mut self, tmp: &Path) -> io::Result<File> {
        let mut out = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp)?;
        out.try_lock_exclusive()?;
        out.write_all(&encode_header(HEADER_LEN))?;

        let live = self.tail - self.head;
        self.file.seek(SeekFrom::Start(self.head))?;
        let copied = io::copy(&mut (&mut self.file).take(live), &mut out)?;
        if copied != live {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("copied {copied} of {live} live bytes"),
            ));
        }
        out.sync_all()?;
        Ok(out)
    }

    /// Drop everything and start over with an empty log
    fn reset(&mut self) -> io::Result<()> {
        write_header(&mut self.file, HEADER_LEN)?;
        self.head = HEADER_LEN;
        self.tail = HEADER_LEN;
        self.file.set_len(HEADER_LEN)
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Header plus unconsumed records
    pub(crate) fn live_bytes(&self) -> u64 {
        HEADER_LEN + (self.tail - self.head)
    }

    /// Physical file size
    pub(crate) fn file_bytes(&self) -> u64 {
        self.tail
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn last_sequence(&self) -> Option<u64> {
        self.index.back().map(|pos| pos.sequence)
    }
}

fn open_locked(path: &Path) -> Result<File, QueueError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    if file.try_lock_exclusive().is_err() {
        return Err(QueueError::Locked {
            path: path.to_path_buf(),
        });
    }
    Ok(file)
}

fn quarantine_path(path: &Path) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{stamp}.corrupt"));
    path.with_file_name(name)
}

fn encode_header(head: u64) -> [u8; HEADER_LEN as usize] {
    let mut buf = [0u8; HEADER_LEN as usize];
    buf[0..4].copy_from_slice(MAGIC);
    buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
    buf[8..16].copy_from_slice(&head.to_le_bytes());
    let crc = crc32fast::hash(&buf[0..16]);
    buf[16..20].copy_from_slice(&crc.to_le_bytes());
    buf
}

fn decode_header(buf: &[u8; HEADER_LEN as usize]) -> Result<u64, String> {
    if &buf[0..4] != MAGIC {
        return Err("bad magic".to_string());
    }
    let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if version != VERSION {
        return Err(format!("unsupported version {version}"));
    }
    let crc = u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]);
    if crc32fast::hash(&buf[0..16]) != crc {
        return Err("header checksum mismatch".to_string());
    }
    let mut head = [0u8; 8];
    head.copy_from_slice(&buf[8..16]);
    Ok(u64::from_le_bytes(head))
}

fn write_header(file: &mut File, head: u64) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&encode_header(head))
}

fn decode_record(buf: &[u8]) -> Result<DiskRecord, String> {
    let body = &buf[RECORD_PREFIX as usize..];
    let crc = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if crc32fast::hash(body) != crc {
        return Err("checksum mismatch".to_string());
    }
    let (sequence, key_len) = decode_body_fixed(body)?;
    let key_end = BODY_FIXED as usize + key_len;
    let key = std::str::from_utf8(&body[BODY_FIXED as usize..key_end])
        .map_err(|e| format!("key is not utf-8: {e}"))?
        .to_string();
    Ok(DiskRecord {
        sequence,
        key,
        value: body[key_end..].to_vec(),
    })
}

fn decode_body_fixed(body: &[u8]) -> Result<(u64, usize), String> {
    if (body.len() as u64) < BODY_FIXED {
        return Err(format!("body of {} bytes is too short", body.len()));
    }
    let mut seq = [0u8; 8];
    seq.copy_from_slice(&body[0..8]);
    let key_len = u32::from_le_bytes([body[8], body[9], body[10], body[11]]) as usize;
    if BODY_FIXED as usize + key_len > body.len() {
        return Err(format!("key length {key_len} overruns body"));
    }
    Ok((u64::from_le_bytes(seq), key_len))
}

/// Walk the file from the header's head offset, verifying every record.
fn scan(file: &File) -> Result<ScanOutcome, ScanError> {
    let file_len = file.metadata()?.len();
    if file_len < HEADER_LEN {
        return Err(ScanError::Corrupt(format!(
            "file of {file_len} bytes is shorter than the header"
        )));
    }

    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; HEADER_LEN as usize];
    reader.read_exact(&mut header)?;
    let head = decode_header(&header).map_err(ScanError::Corrupt)?;
    if head < HEADER_LEN || head > file_len {
        return Err(ScanError::Corrupt(format!(
            "head offset {head} outside file of {file_len} bytes"
        )));
    }

    reader.seek(SeekFrom::Start(head))?;
    let mut records = VecDeque::new();
    let mut pos = head;
    while pos < file_len {
        let remaining = file_len - pos;
        if remaining < RECORD_PREFIX {
            break;
        }
        let mut prefix = [0u8; RECORD_PREFIX as usize];
        reader.read_exact(&mut prefix)?;
        let body_len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as u64;
        let crc = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
        if !(BODY_FIXED..=MAX_RECORD_BODY).contains(&body_len) {
            return Err(ScanError::Corrupt(format!(
                "impossible record length {body_len} at offset {pos}"
            )));
        }
        if remaining < RECORD_PREFIX + body_len {
            break;
        }

        let mut body = vec![0u8; body_len as usize];
        reader.read_exact(&mut body)?;
        if crc32fast::hash(&body) != crc {
            return Err(ScanError::Corrupt(format!(
                "checksum mismatch at offset {pos}"
            )));
        }
        let (sequence, _) = decode_body_fixed(&body)
            .map_err(|reason| ScanError::Corrupt(format!("{reason} at offset {pos}")))?;

        records.push_back(RecordPos {
            offset: pos,
            len: RECORD_PREFIX + body_len,
            sequence,
        });
        pos += RECORD_PREFIX + body_len;
    }

    Ok(ScanOutcome {
        head,
        records,
        valid_end: pos,
        file_len,
    })
}

/// Read-only health report of a queue file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReport {
    pub path: PathBuf,
    pub file_bytes: u64,
    pub records: usize,
    pub live_bytes: u64,
    pub consumed_bytes: u64,
    pub torn_tail_bytes: u64,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    /// Why the file would be quarantined on the next open
    pub corruption: Option<String>,
}

impl LogReport {
    pub fn is_healthy(&self) -> bool {
        self.corruption.is_none() && self.torn_tail_bytes == 0
    }
}

/// Inspect a queue file without opening or locking it.
pub fn inspect(path: &Path) -> Result<LogReport, QueueError> {
    let file = File::open(path)?;
    let file_bytes = file.metadata()?.len();
    let mut report = LogReport {
        path: path.to_path_buf(),
        file_bytes,
        records: 0,
        live_bytes: 0,
        consumed_bytes: 0,
        torn_tail_bytes: 0,
        first_sequence: None,
        last_sequence: None,
        corruption: None,
    };
    if file_bytes == 0 {
        return Ok(report);
    }

    match scan(&file) {
        Ok(outcome) => {
            report.records = outcome.records.len();
            report.live_bytes = HEADER_LEN + (outcome.valid_end - outcome.head);
            report.consumed_bytes = outcome.head - HEADER_LEN;
            report.torn_tail_bytes = outcome.file_len - outcome.valid_end;
            report.first_sequence = outcome.records.front().map(|pos| pos.sequence);
            report.last_sequence = outcome.records.back().map(|pos| pos.sequence);
        }
        Err(ScanError::Io(e)) => return Err(e.into()),
        Err(ScanError::Corrupt(reason)) => report.corruption = Some(reason),
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir, capacity: u64) -> (DiskLog, Recovery) {
        DiskLog::open(&dir.path().join("q.fifo"), capacity).unwrap()
    }

    #[test]
    fn test_append_and_pop_in_order() {
        let dir = TempDir::new().unwrap();
        let (mut log, recovery) = open(&dir, 4096);
        assert_eq!(recovery, Recovery::Created);

        log.append(1, "a", b"one").unwrap();
        log.append(2, "b", b"two").unwrap();
        assert_eq!(log.len(), 2);

        let first = log.pop_front().unwrap().unwrap();
        assert_eq!((first.sequence, first.key.as_str()), (1, "a"));
        assert_eq!(first.value, b"one");
        let second = log.pop_front().unwrap().unwrap();
        assert_eq!(second.value, b"two");
        assert!(log.pop_front().unwrap().is_none());

        // Drained logs shrink back to the header
        assert_eq!(log.file_bytes(), HEADER_LEN);
    }

    #[test]
    fn test_reopen_keeps_unconsumed_records() {
        let dir = TempDir::new().unwrap();
        {
            let (mut log, _) = open(&dir, 4096);
            log.append(1, "k", b"gone").unwrap();
            log.append(2, "k", b"kept").unwrap();
            log.pop_front().unwrap();
        }
        let (mut log, recovery) = open(&dir, 4096);
        assert_eq!(recovery, Recovery::Clean);
        assert_eq!(log.len(), 1);
        assert_eq!(log.last_sequence(), Some(2));
        assert_eq!(log.pop_front().unwrap().unwrap().value, b"kept");
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.fifo");
        {
            let (mut log, _) = open(&dir, 4096);
            log.append(1, "k", b"whole").unwrap();
        }
        let valid_len = fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            // Prefix announcing 100 bytes, followed by only 3
            file.write_all(&100u32.to_le_bytes()).unwrap();
            file.write_all(&[0u8; 4]).unwrap();
            file.write_all(b"abc").unwrap();
        }

        let (mut log, recovery) = open(&dir, 4096);
        assert_eq!(recovery, Recovery::TruncatedTail { dropped_bytes: 11 });
        assert_eq!(fs::metadata(&path).unwrap().len(), valid_len);
        assert_eq!(log.pop_front().unwrap().unwrap().value, b"whole");
    }

    #[test]
    fn test_garbage_file_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.fifo");
        fs::write(&path, b"corrupt!").unwrap();

        let (log, recovery) = open(&dir, 4096);
        match recovery {
            Recovery::Quarantined { moved_to, .. } => {
                assert!(moved_to.to_string_lossy().ends_with(".corrupt"));
                assert_eq!(fs::read(moved_to).unwrap(), b"corrupt!");
            }
            other => panic!("expected quarantine, got {other:?}"),
        }
        assert!(log.is_empty());
    }

    #[test]
    fn test_checksum_mismatch_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.fifo");
        {
            let (mut log, _) = open(&dir, 4096);
            log.append(1, "k", b"payload").unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let (log, recovery) = open(&dir, 4096);
        assert!(matches!(recovery, Recovery::Quarantined { .. }));
        assert!(log.is_empty());
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = TempDir::new().unwrap();
        let _held = open(&dir, 4096);
        let err = DiskLog::open(&dir.path().join("q.fifo"), 4096).unwrap_err();
        assert!(matches!(err, QueueError::Locked { .. }));
    }

    #[test]
    fn test_compact_reclaims_consumed_prefix() {
        let dir = TempDir::new().unwrap();
        let (mut log, _) = open(&dir, 4096);
        for seq in 0..4 {
            log.append(seq, "k", &[seq as u8; 16]).unwrap();
        }
        log.pop_front().unwrap();
        log.pop_front().unwrap();

        let before = log.file_bytes();
        let reclaimed = log.compact().unwrap();
        assert!(reclaimed > 0);
        assert_eq!(log.file_bytes(), before - reclaimed);
        assert_eq!(log.live_bytes(), log.file_bytes());

        assert_eq!(log.pop_front().unwrap().unwrap().sequence, 2);
        log.append(9, "k", b"after").unwrap();
        assert_eq!(log.pop_front().unwrap().unwrap().sequence, 3);
        assert_eq!(log.pop_front().unwrap().unwrap().value, b"after");
    }

    #[test]
    fn test_compacted_log_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let (mut log, _) = open(&dir, 4096);
            log.append(1, "k", b"one").unwrap();
            log.append(2, "k", b"two").unwrap();
            log.pop_front().unwrap();
            log.compact().unwrap();
        }
        let (mut log, recovery) = open(&dir, 4096);
        assert_eq!(recovery, Recovery::Clean);
        assert_eq!(log.pop_front().unwrap().unwrap().value, b"two");
    }

    #[test]
    fn test_inspect_reports_without_locking() {
        let dir = TempDir::new().unwrap();
        let (mut log, _) = open(&dir, 4096);
        log.append(5, "k", b"x").unwrap();
        log.append(6, "k", b"y").unwrap();

        let report = inspect(log.path()).unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.records, 2);
        assert_eq!(report.first_sequence, Some(5));
        assert_eq!(report.last_sequence, Some(6));
        assert_eq!(report.live_bytes, log.live_bytes());

        fs::write(dir.path().join("bad.fifo"), b"corrupt!").unwrap();
        let report = inspect(&dir.path().join("bad.fifo")).unwrap();
        assert!(report.corruption.is_some());
    }

    #[test]
    fn test_file_stays_within_capacity_under_churn() {
        let dir = TempDir::new().unwrap();
        let record = DiskLog::record_len(1, 10);
        let capacity = HEADER_LEN + 3 * record;
        let (mut log, _) = open(&dir, capacity);

        log.append(0, "k", b"0000000000").unwrap();
        for seq in 1..1000u64 {
            assert!(log.has_room(record));
            log.append(seq, "k", format!("{seq:010}").as_bytes()).unwrap();
            assert_eq!(log.pop_front().unwrap().unwrap().sequence, seq - 1);
            assert!(log.file_bytes() <= capacity, "file grew to {}", log.file_bytes());
        }
        assert_eq!(log.len(), 1);
        assert_eq!(log.pop_front().unwrap().unwrap().value, b"0000000999");
    }

    #[test]
    fn test_failed_header_write_keeps_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.fifo");
        let (mut log, _) = open(&dir, 4096);
        log.append(1, "k", b"first").unwrap();
        log.append(2, "k", b"second").unwrap();

        // A read-only handle lets the record be read but not the header rewritten
        log.file = File::open(&path).unwrap();
        assert!(log.pop_front().is_err());
        assert_eq!(log.len(), 2);

        log.file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        assert_eq!(log.pop_front().unwrap().unwrap().value, b"first");
        assert_eq!(log.pop_front().unwrap().unwrap().value, b"second");
    }
}
