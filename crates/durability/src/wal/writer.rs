//! Single-file commit log with durability mode support
//!
//! A path-backed database keeps one append-only file. Every commit appends
//! exactly one [`CommitRecord`] before its writes become visible. Opening the
//! log replays every intact record; the first record that is short, fails
//! its checksum or does not decode marks the end of the log, and everything
//! from there on is truncated away.

use super::DurabilityMode;
use crate::record::CommitRecord;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use stratakv_core::{KvError, KvResult};
use stratakv_storage::OrderedStore;
use tracing::{debug, error, info, warn};

/// Cumulative commit log counters
///
/// These accumulate over the lifetime of the log handle and are never reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalCounters {
    /// Records appended
    pub appends: u64,
    /// fsync calls issued
    pub sync_calls: u64,
    /// Bytes appended
    pub bytes_written: u64,
}

/// The state recovered from an existing log
#[derive(Debug, Clone, Default)]
pub struct Recovery {
    /// Intact records in log order
    pub records: Vec<CommitRecord>,
    /// Version of the last intact record, 0 for an empty log
    pub last_version: u64,
    /// Bytes discarded from a torn or corrupt tail
    pub truncated_bytes: u64,
}

impl Recovery {
    /// Replay every record into `store`, returning the last applied version
    pub fn apply_to(self, store: &OrderedStore) -> u64 {
        let last_version = self.last_version;
        for record in self.records {
            let version = record.version;
            store.apply(&record.into_ops(), version);
        }
        last_version
    }
}

/// Byte sink a commit log appends to
///
/// `File` in production. Every failure after bytes reach the sink is undone
/// with [`LogSink::rollback_to`].
trait LogSink: Write + Send {
    /// Make appended data durable
    fn sync_data(&mut self) -> io::Result<()>;

    /// Make data and metadata durable
    fn sync_all(&mut self) -> io::Result<()>;

    /// Cut the sink back to `len` bytes and continue writing there
    fn rollback_to(&mut self, len: u64) -> io::Result<()>;
}

impl LogSink for File {
    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        File::sync_all(self)
    }

    fn rollback_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        File::sync_all(self)
    }
}

struct LogFile {
    sink: Box<dyn LogSink>,
    write_position: u64,
    has_unsynced_data: bool,
    counters: WalCounters,
    /// Set when a failed append could not be rolled back
    failed: Option<String>,
}

fn write_record(sink: &mut dyn LogSink, bytes: &[u8], sync: bool) -> io::Result<()> {
    sink.write_all(bytes)?;
    if sync {
        sink.sync_data()?;
    }
    Ok(())
}

/// Append-only commit log
pub struct CommitLog {
    inner: Mutex<LogFile>,
    path: PathBuf,
    durability: DurabilityMode,
}

impl CommitLog {
    /// Open (creating if missing) the log at `path` and recover its records
    pub fn open(path: impl AsRef<Path>, durability: DurabilityMode) -> KvResult<(Self, Recovery)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut recovery = Recovery::default();
        let mut offset = 0usize;
        while offset < bytes.len() {
            match CommitRecord::from_bytes(&bytes[offset..]) {
                Ok((record, consumed)) => {
                    if record.version <= recovery.last_version {
                        return Err(KvError::Corruption(format!(
                            "commit log version {} does not follow {}",
                            record.version, recovery.last_version
                        )));
                    }
                    recovery.last_version = record.version;
                    recovery.records.push(record);
                    offset += consumed;
                }
                Err(err) => {
                    warn!(
                        target: "stratakv::wal",
                        path = %path.display(),
                        offset,
                        discarded = bytes.len() - offset,
                        error = %err,
                        "Truncating commit log tail"
                    );
                    break;
                }
            }
        }

        recovery.truncated_bytes = (bytes.len() - offset) as u64;
        if recovery.truncated_bytes > 0 {
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(offset as u64))?;

        info!(
            target: "stratakv::wal",
            path = %path.display(),
            records = recovery.records.len(),
            last_version = recovery.last_version,
            "Recovered commit log"
        );

        let log = CommitLog::from_sink(Box::new(file), offset as u64, path, durability);
        Ok((log, recovery))
    }

    fn from_sink(
        sink: Box<dyn LogSink>,
        write_position: u64,
        path: PathBuf,
        durability: DurabilityMode,
    ) -> Self {
        CommitLog {
            inner: Mutex::new(LogFile {
                sink,
                write_position,
                has_unsynced_data: false,
                counters: WalCounters::default(),
                failed: None,
            }),
            path,
            durability,
        }
    }

    /// Append one record, fsyncing first if the mode requires it
    ///
    /// A failed write or fsync cuts the file back to its previous length
    /// before the error is returned, so a record whose append failed is never
    /// replayed. If that rollback fails too, the log refuses every later
    /// append.
    pub fn append(&self, record: &CommitRecord) -> KvResult<()> {
        let bytes = record.to_bytes()?;
        let mut guard = self.inner.lock();
        let log = &mut *guard;

        if let Some(reason) = &log.failed {
            return Err(KvError::Corruption(format!(
                "commit log rejected append after failed rollback: {}",
                reason
            )));
        }

        let immediate = self.durability.requires_immediate_fsync();
        if let Err(err) = write_record(log.sink.as_mut(), &bytes, immediate) {
            let position = log.write_position;
            if let Err(rollback) = log.sink.rollback_to(position) {
                error!(
                    target: "stratakv::wal",
                    path = %self.path.display(),
                    position,
                    error = %rollback,
                    "Failed to roll back commit record"
                );
                log.failed = Some(rollback.to_string());
                return Err(rollback.into());
            }
            warn!(
                target: "stratakv::wal",
                version = record.version,
                error = %err,
                "Rolled back failed commit record"
            );
            return Err(err.into());
        }

        log.write_position += bytes.len() as u64;
        log.counters.appends += 1;
        log.counters.bytes_written += bytes.len() as u64;
        if immediate {
            log.counters.sync_calls += 1;
        } else {
            log.has_unsynced_data = true;
        }

        debug!(
            target: "stratakv::wal",
            version = record.version,
            writes = record.writes.len(),
            bytes = bytes.len(),
            "Appended commit record"
        );
        Ok(())
    }

    /// True once a failed append could not be rolled back
    pub fn is_failed(&self) -> bool {
        self.inner.lock().failed.is_some()
    }

    /// Flush anything not yet synced to disk
    pub fn sync(&self) -> KvResult<()> {
        let mut log = self.inner.lock();
        if log.has_unsynced_data {
            log.sink.flush()?;
            log.sink.sync_all()?;
            log.has_unsynced_data = false;
            log.counters.sync_calls += 1;
        }
        Ok(())
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured durability mode
    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    /// Current log size in bytes
    pub fn size(&self) -> u64 {
        self.inner.lock().write_position
    }

    /// Snapshot of the cumulative counters
    pub fn counters(&self) -> WalCounters {
        self.inner.lock().counters.clone()
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("path", &self.path)
            .field("durability", &self.durability)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stratakv_storage::WriteOp;

    #[derive(Default)]
    struct Faults {
        data: Vec<u8>,
        fail_write: bool,
        fail_sync: bool,
        fail_rollback: bool,
    }

    /// In-memory sink whose operations fail on demand
    #[derive(Clone, Default)]
    struct FaultySink(Arc<Mutex<Faults>>);

    impl Write for FaultySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut state = self.0.lock();
            if state.fail_write {
                // Leave a torn record behind, as a short write would
                state.data.extend_from_slice(&buf[..buf.len() / 2]);
                return Err(io::Error::new(io::ErrorKind::Other, "write failed"));
            }
            state.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogSink for FaultySink {
        fn sync_data(&mut self) -> io::Result<()> {
            if self.0.lock().fail_sync {
                return Err(io::Error::new(io::ErrorKind::Other, "fsync failed"));
            }
            Ok(())
        }

        fn sync_all(&mut self) -> io::Result<()> {
            self.sync_data()
        }

        fn rollback_to(&mut self, len: u64) -> io::Result<()> {
            let mut state = self.0.lock();
            if state.fail_rollback {
                return Err(io::Error::new(io::ErrorKind::Other, "truncate failed"));
            }
            state.data.truncate(len as usize);
            Ok(())
        }
    }

    fn log_over(sink: &FaultySink, durability: DurabilityMode) -> CommitLog {
        CommitLog::from_sink(Box::new(sink.clone()), 0, PathBuf::from("faulty.log"), durability)
    }

    fn record(version: u64) -> CommitRecord {
        CommitRecord::new(
            version,
            &[WriteOp::Put {
                key: format!("k{}", version).into_bytes(),
                value: vec![0xFF, 0x01, 0x03],
                expires_at: None,
            }],
        )
    }

    fn versions(sink: &FaultySink) -> Vec<u64> {
        let data = sink.0.lock().data.clone();
        let mut offset = 0;
        let mut versions = Vec::new();
        while offset < data.len() {
            let (record, consumed) = CommitRecord::from_bytes(&data[offset..]).unwrap();
            versions.push(record.version);
            offset += consumed;
        }
        versions
    }

    // ========================================================================
    // Failed appends leave nothing to replay
    // ========================================================================

    #[test]
    fn test_failed_fsync_rolls_back_record() {
        let sink = FaultySink::default();
        let log = log_over(&sink, DurabilityMode::Always);
        log.append(&record(1)).unwrap();

        sink.0.lock().fail_sync = true;
        assert!(log.append(&record(2)).is_err());
        assert_eq!(versions(&sink), vec![1]);
        assert_eq!(log.counters().appends, 1);
        assert_eq!(log.size(), sink.0.lock().data.len() as u64);

        sink.0.lock().fail_sync = false;
        log.append(&record(2)).unwrap();
        assert_eq!(versions(&sink), vec![1, 2]);
        assert!(!log.is_failed());
    }

    #[test]
    fn test_partial_write_rolls_back_record() {
        let sink = FaultySink::default();
        let log = log_over(&sink, DurabilityMode::Always);

        sink.0.lock().fail_write = true;
        assert!(matches!(log.append(&record(1)), Err(KvError::Io(_))));
        assert!(sink.0.lock().data.is_empty());
        assert_eq!(log.size(), 0);

        sink.0.lock().fail_write = false;
        log.append(&record(1)).unwrap();
        log.append(&record(2)).unwrap();
        assert_eq!(versions(&sink), vec![1, 2]);
    }

    #[test]
    fn test_failed_rollback_rejects_later_appends() {
        let sink = FaultySink::default();
        let log = log_over(&sink, DurabilityMode::Always);
        {
            let mut state = sink.0.lock();
            state.fail_sync = true;
            state.fail_rollback = true;
        }
        assert!(matches!(log.append(&record(1)), Err(KvError::Io(_))));
        assert!(log.is_failed());

        {
            let mut state = sink.0.lock();
            state.fail_sync = false;
            state.fail_rollback = false;
        }
        assert!(matches!(log.append(&record(2)), Err(KvError::Corruption(_))));
        assert_eq!(log.counters().appends, 0);
    }

    #[test]
    fn test_buffered_append_skips_fsync() {
        let sink = FaultySink::default();
        let log = log_over(&sink, DurabilityMode::Buffered);
        sink.0.lock().fail_sync = true;

        log.append(&record(1)).unwrap();
        assert_eq!(log.counters().sync_calls, 0);
        assert!(log.sync().is_err());
    }
}
