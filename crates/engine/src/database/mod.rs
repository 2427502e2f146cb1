//! Database handle and open/close logic
//!
//! This module provides the [`Database`] struct that orchestrates:
//! - Location parsing (`":memory:"` or a commit log path)
//! - Commit log replay on open
//! - Point reads, batched reads and list scans
//! - Atomic batches through the commit coordinator
//! - Purging expired entries, on demand and from a background sweeper
//! - Close, after which every operation fails with [`KvError::Closed`]
//!
//! ## Lifecycle Gate
//!
//! Every operation holds a shared guard on the open flag for its duration;
//! `close()` takes the exclusive guard, so it waits for in-flight operations
//! and no operation starts once it returns. List iterators take the guard
//! per page.

pub mod config;
pub mod location;

pub use config::DatabaseConfig;
pub use location::{Location, MEMORY_LOCATION};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use stratakv_concurrency::{AtomicBatch, AtomicOperation, CommitResult, CommitTarget};
use stratakv_core::{
    deserialize_value, encode_key, now_millis, Key, KvEntryMaybe, KvError, KvResult, Limits,
    Value, Versionstamp,
};
use stratakv_durability::CommitLog;
use stratakv_storage::{OrderedStore, StoredValue};
use tracing::{info, warn};

use crate::coordinator::{CommitCoordinator, CommitMetrics};
use crate::expiry::{purge_all, ExpirySweeper};
use crate::list::{ListIterator, ListOptions, ListSelector, PageSource};

// ============================================================================
// Database Struct
// ============================================================================

/// An open key-value database
///
/// Independent handles never share state, even when opened on the same
/// location string `":memory:"`.
///
/// # Example
///
/// ```text
/// use stratakv_engine::Database;
/// use stratakv_core::{Key, KeyPart};
///
/// let db = Database::open(":memory:")?;
/// let key = Key::new(vec![KeyPart::from("users"), KeyPart::from(1i64)]);
/// let stamp = db.set(key.clone(), "alice")?;
/// assert_eq!(db.get(&key)?.versionstamp, Some(stamp));
/// db.close()?;
/// ```
pub struct Database {
    location: Location,
    config: DatabaseConfig,
    limits: Limits,
    store: Arc<OrderedStore>,
    coordinator: CommitCoordinator,
    sweeper: Mutex<Option<ExpirySweeper>>,
    open: RwLock<bool>,
}

impl Database {
    /// Open a database with the default configuration
    pub fn open(location: &str) -> KvResult<Self> {
        Self::open_with_config(location, DatabaseConfig::default())
    }

    /// Open a database
    ///
    /// `":memory:"` opens an ephemeral store. Any other non-empty string not
    /// starting with `:` is the path of a commit log, created if missing and
    /// replayed if present.
    pub fn open_with_config(location: &str, config: DatabaseConfig) -> KvResult<Self> {
        let location = Location::parse(location)?;
        let limits = config.limits();
        let store = Arc::new(OrderedStore::new());

        let log = match &location {
            Location::Memory => None,
            Location::Path(path) => {
                let (log, recovery) = CommitLog::open(path, config.durability)?;
                let records = recovery.records.len();
                let version = recovery.apply_to(&store);
                info!(
                    target: "stratakv::db",
                    path = %path.display(),
                    records,
                    version,
                    "Recovered database"
                );
                Some(log)
            }
        };

        let coordinator =
            CommitCoordinator::new(Arc::clone(&store), log, config.lock_stripes, limits.clone());
        let sweeper = match config.expiry_sweep_interval() {
            Some(interval) => Some(ExpirySweeper::start(
                Arc::clone(coordinator.manager()),
                interval,
            )?),
            None => None,
        };
        info!(target: "stratakv::db", location = %location, "Database opened");

        Ok(Database {
            location,
            config,
            limits,
            store,
            coordinator,
            sweeper: Mutex::new(sweeper),
            open: RwLock::new(true),
        })
    }

    fn gate(&self) -> KvResult<RwLockReadGuard<'_, bool>> {
        let guard = self.open.read();
        if *guard {
            Ok(guard)
        } else {
            Err(KvError::Closed)
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read one key
    ///
    /// A missing or expired key yields an entry with no value and no
    /// versionstamp.
    pub fn get(&self, key: &Key) -> KvResult<KvEntryMaybe> {
        let _open = self.gate()?;
        let encoded = encode_key(key)?;
        self.limits.validate_read_key(&encoded)?;
        to_entry(key.clone(), self.store.get(&encoded))
    }

    /// Read up to 10 keys under one consistent view
    ///
    /// Results are in input order. Exceeding the key count fails without
    /// reading anything.
    pub fn get_many(&self, keys: &[Key]) -> KvResult<Vec<KvEntryMaybe>> {
        let _open = self.gate()?;
        self.limits.validate_read_count(keys.len())?;
        let encoded = keys
            .iter()
            .map(|key| -> KvResult<Vec<u8>> {
                let encoded = encode_key(key)?;
                self.limits.validate_read_key(&encoded)?;
                Ok(encoded)
            })
            .collect::<KvResult<Vec<_>>>()?;
        keys.iter()
            .cloned()
            .zip(self.store.get_many(&encoded))
            .map(|(key, stored)| to_entry(key, stored))
            .collect()
    }

    /// Scan a key range
    ///
    /// The selector and options are validated immediately; entries are read
    /// lazily, one page per `batch_size`.
    pub fn list(&self, selector: &ListSelector, options: ListOptions) -> KvResult<ListIterator<'_>> {
        let _open = self.gate()?;
        ListIterator::new(self, selector, options, &self.limits)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Start an atomic batch
    pub fn atomic(&self) -> AtomicOperation<'_> {
        AtomicOperation::new(self)
    }

    /// Store `value` at `key` in its own commit
    pub fn set(&self, key: Key, value: impl Into<Value>) -> KvResult<Versionstamp> {
        let result = self.atomic().set(key, value).commit()?;
        result
            .versionstamp()
            .ok_or_else(|| KvError::type_error("Failed to set value"))
    }

    /// Store `value` at `key`, reading as absent once `expire_in` has passed
    pub fn set_with_expiry(
        &self,
        key: Key,
        value: impl Into<Value>,
        expire_in: Duration,
    ) -> KvResult<Versionstamp> {
        let result = self
            .atomic()
            .set_with_expiry(key, value, expire_in)
            .commit()?;
        result
            .versionstamp()
            .ok_or_else(|| KvError::type_error("Failed to set value"))
    }

    /// Remove `key` in its own commit; removing a missing key succeeds
    pub fn delete(&self, key: Key) -> KvResult<()> {
        let result = self.atomic().delete(key).commit()?;
        if result.is_ok() {
            Ok(())
        } else {
            Err(KvError::type_error("Failed to delete value"))
        }
    }

    /// Delete every entry whose expiry has passed
    ///
    /// Expired entries already read as absent; purging reclaims their space
    /// and, for path-backed stores, logs the deletes so replay skips them.
    /// The background sweeper does the same periodically. Returns the number
    /// of entries removed.
    pub fn purge_expired(&self) -> KvResult<usize> {
        let _open = self.gate()?;
        purge_all(self.coordinator.manager(), now_millis())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Close the database
    ///
    /// Waits for in-flight operations, stops the expiry sweeper, flushes the
    /// commit log and marks the handle closed. Closing an already closed
    /// handle is a no-op.
    pub fn close(&self) -> KvResult<()> {
        let mut open = self.open.write();
        if !*open {
            return Ok(());
        }
        *open = false;
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.shutdown();
        }
        self.coordinator.manager().sync()?;
        info!(
            target: "stratakv::db",
            location = %self.location,
            version = self.coordinator.current_version(),
            "Database closed"
        );
        Ok(())
    }

    /// True once [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        !*self.open.read()
    }

    /// Where this database keeps its data
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Configuration the database was opened with
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Limits enforced by this database
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Commit counters since open
    pub fn metrics(&self) -> CommitMetrics {
        self.coordinator.metrics()
    }

    /// Version of the latest published commit
    pub fn current_version(&self) -> u64 {
        self.coordinator.current_version()
    }
}

fn to_entry(key: Key, stored: Option<StoredValue>) -> KvResult<KvEntryMaybe> {
    match stored {
        Some(stored) => Ok(KvEntryMaybe {
            key,
            value: Some(deserialize_value(stored.bytes())?),
            versionstamp: Some(stored.versionstamp()),
        }),
        None => Ok(KvEntryMaybe::absent(key)),
    }
}

impl CommitTarget for Database {
    fn commit_batch(&self, batch: AtomicBatch) -> KvResult<CommitResult> {
        let _open = self.gate()?;
        self.coordinator.commit(batch)
    }
}

impl PageSource for Database {
    fn fetch_page(
        &self,
        start: &[u8],
        end: &[u8],
        reverse: bool,
        limit: usize,
    ) -> KvResult<Vec<(Vec<u8>, StoredValue)>> {
        let _open = self.gate()?;
        Ok(self.store.scan(start, end, reverse, limit))
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Some(mut sweeper) = self.sweeper.get_mut().take() {
            sweeper.shutdown();
        }
        if *self.open.get_mut() {
            if let Err(e) = self.coordinator.manager().sync() {
                warn!(target: "stratakv::db", error = %e, "Failed to flush commit log on drop");
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("location", &self.location)
            .field("version", &self.coordinator.current_version())
            .field("closed", &self.is_closed())
            .finish()
    }
}
