//! Commit manager for atomic batches
//!
//! Provides atomic commit by orchestrating:
//! 1. Preparation (key encoding, serialization, size limits)
//! 2. Validation of checks under per-key stripe locks
//! 3. Mutation resolution (sum/min/max read the current value)
//! 4. Commit log append (durability, path-backed stores only)
//! 5. Store application (visibility)
//!
//! It also purges expired entries through the same log-then-apply path.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. validate_batch_shape()       - check/mutation counts
//! 2. prepare_checks()             - encode, read-key limit
//! 3. prepare_mutations()          - encode, serialize, write/value/total limits
//! 4. lock_keys()                  - stripes of every touched key, ascending
//! 5. store.read()
//!    validate_checks()            - IF conflicts: return Conflict
//!    resolve_mutations()          - concrete puts/deletes
//! 6. commit_order.lock()
//!    next_version()
//!    log.append()                 - DURABILITY POINT
//!    store.write().apply()        - VISIBILITY POINT
//!    advance(version)
//! 7. Return Committed(versionstamp)
//! ```
//!
//! Steps 1-3 touch nothing shared, so a malformed batch fails before any lock
//! is taken. Step 6 runs under the commit-order mutex, so log order, apply
//! order and version order agree. The store write guard covers only the
//! apply: readers never wait on an fsync and never see a batch half-applied.
//! A failed append consumes no version.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use stratakv_core::{now_millis, KvResult, Limits, Versionstamp};
use stratakv_durability::{CommitLog, CommitRecord};
use stratakv_storage::{OrderedStore, WriteOp};
use tracing::debug;

use crate::atomic::{AtomicBatch, CommitResult, CommitTarget};
use crate::locks::KeyLockTable;
use crate::mutation::{prepare_mutations, resolve_mutations};
use crate::validation::{prepare_checks, validate_checks};

/// Monotonic commit version counter
#[derive(Debug, Default)]
pub struct VersionAllocator {
    version: AtomicU64,
}

impl VersionAllocator {
    /// Start after `initial` (typically the last recovered version)
    pub fn new(initial: u64) -> Self {
        VersionAllocator {
            version: AtomicU64::new(initial),
        }
    }

    /// Highest published version
    pub fn current(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// The version the next commit will publish
    pub fn next_version(&self) -> u64 {
        self.current() + 1
    }

    /// Publish `version`; the counter never moves backwards
    pub fn advance(&self, version: u64) {
        self.version.fetch_max(version, Ordering::SeqCst);
    }
}

/// Commits atomic batches against one store
pub struct CommitManager {
    store: Arc<OrderedStore>,
    log: Option<CommitLog>,
    locks: KeyLockTable,
    commit_order: Mutex<()>,
    allocator: VersionAllocator,
    limits: Limits,
}

impl CommitManager {
    /// Create a manager over `store`
    ///
    /// Versions continue from the store's current watermark. With a `log`,
    /// every commit is appended before it becomes visible.
    pub fn new(
        store: Arc<OrderedStore>,
        log: Option<CommitLog>,
        lock_stripes: usize,
        limits: Limits,
    ) -> Self {
        let allocator = VersionAllocator::new(store.current_version());
        CommitManager {
            store,
            log,
            locks: KeyLockTable::new(lock_stripes),
            commit_order: Mutex::new(()),
            allocator,
            limits,
        }
    }

    /// The store commits are applied to
    pub fn store(&self) -> &Arc<OrderedStore> {
        &self.store
    }

    /// Limits enforced on every commit
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// The commit log, if the store is path-backed
    pub fn log(&self) -> Option<&CommitLog> {
        self.log.as_ref()
    }

    /// Version of the latest published commit
    pub fn current_version(&self) -> u64 {
        self.allocator.current()
    }

    /// Flush any buffered commit log writes
    pub fn sync(&self) -> KvResult<()> {
        match &self.log {
            Some(log) => log.sync(),
            None => Ok(()),
        }
    }

    /// Validate and apply one atomic batch
    ///
    /// # Returns
    /// - `Ok(Committed)` with the versionstamp shared by every written key
    /// - `Ok(Conflict)` if any check failed; nothing is applied
    /// - `Err` for malformed batches, type mismatches and log failures;
    ///   nothing is applied
    pub fn commit(&self, batch: AtomicBatch) -> KvResult<CommitResult> {
        self.limits
            .validate_batch_shape(batch.checks.len(), batch.mutations.len())?;
        let checks = prepare_checks(&batch.checks, &self.limits)?;
        let mutations = prepare_mutations(&batch.mutations, &self.limits, now_millis())?;

        let _stripes = self.locks.lock_keys(
            checks
                .iter()
                .map(|c| c.encoded.as_slice())
                .chain(mutations.iter().map(|m| m.encoded.as_slice())),
        );

        let ops = {
            let view = self.store.read();
            let validation = validate_checks(&checks, &view);
            if !validation.is_valid() {
                debug!(
                    target: "stratakv::txn",
                    conflicts = validation.conflict_count(),
                    "Atomic check failed"
                );
                return Ok(CommitResult::Conflict);
            }
            resolve_mutations(mutations, &view)?
        };

        let version = self.publish(&ops)?;
        debug!(
            target: "stratakv::txn",
            version,
            checks = checks.len(),
            writes = ops.len(),
            "Committed atomic batch"
        );
        Ok(CommitResult::Committed {
            versionstamp: Versionstamp::from_version(version),
        })
    }

    /// Delete up to `max` entries whose deadline passed at `now`
    ///
    /// The deletes are committed like any batch: they take the key stripes,
    /// get a version and are appended to the commit log, so replay drops the
    /// same entries. Keys rewritten since they were found are left alone.
    /// Returns the number of entries removed; nothing is committed when none
    /// are due.
    pub fn purge_expired(&self, now: u64, max: usize) -> KvResult<usize> {
        let due = self.store.expired_keys(now, max);
        if due.is_empty() {
            return Ok(0);
        }

        let _stripes = self.locks.lock_keys(due.iter().map(Vec::as_slice));
        let ops: Vec<WriteOp> = {
            let view = self.store.read();
            due.into_iter()
                .filter(|key| view.is_expired(key))
                .map(|key| WriteOp::Delete { key })
                .collect()
        };
        if ops.is_empty() {
            return Ok(0);
        }

        let version = self.publish(&ops)?;
        debug!(
            target: "stratakv::txn",
            version,
            purged = ops.len(),
            "Purged expired entries"
        );
        Ok(ops.len())
    }

    /// Log and apply a resolved write set under the next version
    fn publish(&self, ops: &[WriteOp]) -> KvResult<u64> {
        let _order = self.commit_order.lock();
        let version = self.allocator.next_version();
        if let Some(log) = &self.log {
            log.append(&CommitRecord::new(version, ops))?;
        }
        self.store.write().apply(ops, version);
        self.allocator.advance(version);
        Ok(version)
    }
}

impl CommitTarget for CommitManager {
    fn commit_batch(&self, batch: AtomicBatch) -> KvResult<CommitResult> {
        self.commit(batch)
    }
}

impl std::fmt::Debug for CommitManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitManager")
            .field("version", &self.allocator.current())
            .field("stripes", &self.locks.stripe_count())
            .field("log", &self.log.as_ref().map(CommitLog::path))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::AtomicOperation;
    use stratakv_core::{encode_key, Key, KeyPart, KvError, KvU64, LimitError, Value};

    fn key(name: &str) -> Key {
        Key::new(vec![KeyPart::from(name)])
    }

    fn manager() -> CommitManager {
        CommitManager::new(Arc::new(OrderedStore::new()), None, 64, Limits::default())
    }

    fn stored_version(manager: &CommitManager, name: &str) -> Option<u64> {
        manager
            .store()
            .get(&encode_key(&key(name)).unwrap())
            .map(|sv| sv.version())
    }

    #[test]
    fn test_allocator_is_monotonic() {
        let allocator = VersionAllocator::new(5);
        assert_eq!(allocator.next_version(), 6);
        allocator.advance(6);
        assert_eq!(allocator.next_version(), 7);
        allocator.advance(3);
        assert_eq!(allocator.current(), 6);
    }

    #[test]
    fn test_first_commits_get_sequential_versionstamps() {
        let m = manager();
        let first = AtomicOperation::new(&m).set(key("a"), "x").commit().unwrap();
        let second = AtomicOperation::new(&m).set(key("b"), "y").commit().unwrap();
        assert_eq!(
            first.versionstamp().unwrap().to_string(),
            "00000000000000010000"
        );
        assert_eq!(
            second.versionstamp().unwrap().to_string(),
            "00000000000000020000"
        );
    }

    #[test]
    fn test_all_keys_share_one_version() {
        let m = manager();
        AtomicOperation::new(&m)
            .set(key("a"), "x")
            .set(key("b"), "y")
            .sum(key("c"), KvU64::new(1))
            .commit()
            .unwrap();
        assert_eq!(stored_version(&m, "a"), Some(1));
        assert_eq!(stored_version(&m, "b"), Some(1));
        assert_eq!(stored_version(&m, "c"), Some(1));
    }

    #[test]
    fn test_conflict_applies_nothing() {
        let m = manager();
        AtomicOperation::new(&m).set(key("a"), "x").commit().unwrap();

        let result = AtomicOperation::new(&m)
            .check(key("a"), None)
            .set(key("b"), "y")
            .commit()
            .unwrap();
        assert_eq!(result, CommitResult::Conflict);
        assert_eq!(stored_version(&m, "b"), None);
        assert_eq!(m.current_version(), 1);
    }

    #[test]
    fn test_type_error_applies_nothing() {
        let m = manager();
        AtomicOperation::new(&m).set(key("s"), "text").commit().unwrap();

        let err = AtomicOperation::new(&m)
            .set(key("a"), "x")
            .sum(key("s"), KvU64::new(1))
            .commit()
            .unwrap_err();
        assert!(err.is_type_error());
        assert_eq!(stored_version(&m, "a"), None);
        assert_eq!(m.current_version(), 1);
    }

    #[test]
    fn test_too_many_mutations_rejected_before_locking() {
        let m = manager();
        let mut op = AtomicOperation::new(&m);
        for i in 0..11 {
            op = op.set(Key::new(vec![KeyPart::from(i as i64)]), Value::from(true));
        }
        let err = op.commit().unwrap_err();
        assert!(matches!(
            err,
            KvError::SizeLimit(LimitError::TooManyMutations { max: 10 })
        ));
        assert!(m.store().is_empty());
    }

    #[test]
    fn test_check_only_batch_commits() {
        let m = manager();
        let result = AtomicOperation::new(&m)
            .check(key("missing"), None)
            .commit()
            .unwrap();
        assert!(result.is_ok());
    }

    // ========================================================================
    // Expiry purge
    // ========================================================================

    fn expiring_put(name: &str, expires_at: u64) -> WriteOp {
        WriteOp::Put {
            key: encode_key(&key(name)).unwrap(),
            value: stratakv_core::serialize_value(&Value::from("v")).unwrap(),
            expires_at: Some(expires_at),
        }
    }

    fn manager_with(ops: &[WriteOp]) -> CommitManager {
        let store = Arc::new(OrderedStore::new());
        store.apply(ops, 1);
        CommitManager::new(store, None, 64, Limits::default())
    }

    #[test]
    fn test_purge_removes_only_due_entries() {
        let now = now_millis();
        let m = manager_with(&[expiring_put("old", now), expiring_put("new", now + 3_600_000)]);

        assert_eq!(m.purge_expired(now - 1, 100).unwrap(), 0);
        assert_eq!(m.current_version(), 1);

        assert_eq!(m.purge_expired(now, 100).unwrap(), 1);
        assert_eq!(m.store().len(), 1);
        assert_eq!(m.store().expiring_len(), 1);
        assert_eq!(m.current_version(), 2);
        assert_eq!(stored_version(&m, "new"), Some(1));
    }

    #[test]
    fn test_purge_respects_max() {
        let m = manager_with(&[expiring_put("a", 1), expiring_put("b", 1), expiring_put("c", 1)]);
        assert_eq!(m.purge_expired(now_millis(), 2).unwrap(), 2);
        assert_eq!(m.purge_expired(now_millis(), 2).unwrap(), 1);
        assert!(m.store().is_empty());
        assert_eq!(m.current_version(), 3);
    }

    #[test]
    fn test_purge_skips_rewritten_keys() {
        let m = manager_with(&[expiring_put("a", 1)]);
        AtomicOperation::new(&m).set(key("a"), "fresh").commit().unwrap();

        assert_eq!(m.purge_expired(now_millis(), 10).unwrap(), 0);
        assert_eq!(stored_version(&m, "a"), Some(2));
    }
}
