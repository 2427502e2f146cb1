//! OrderedStore: BTreeMap keyed by encoded key bytes
//!
//! - `BTreeMap<Vec<u8>, StoredValue>` for ordered storage; encoded keys sort
//!   in logical key order, so range scans are plain byte ranges
//! - `parking_lot::RwLock` for thread-safe access
//! - `AtomicU64` watermark of the highest applied commit version
//! - [`ExpiryIndex`] of every entry carrying a deadline
//!
//! # Design Notes
//!
//! - **No version history**: each key stores only its latest value
//! - **Logical expiration**: expired values are filtered at read time and
//!   stay stored until a purge commit deletes them (see
//!   [`OrderedStore::expired_keys`])
//! - **Guards**: commits validate under [`OrderedStore::read`] and apply
//!   under [`OrderedStore::write`], so a batch is never visible half-applied

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use stratakv_core::now_millis;
use tracing::trace;

use crate::stored_value::StoredValue;
use crate::ttl::ExpiryIndex;

/// One resolved write of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or overwrite a key
    Put {
        /// Encoded key
        key: Vec<u8>,
        /// Serialized value
        value: Vec<u8>,
        /// Expiry deadline (ms since epoch)
        expires_at: Option<u64>,
    },
    /// Remove a key
    Delete {
        /// Encoded key
        key: Vec<u8>,
    },
}

impl WriteOp {
    /// Encoded key this write targets
    pub fn key(&self) -> &[u8] {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// Entries plus the expiry index, guarded together
#[derive(Debug, Default)]
struct Tables {
    entries: BTreeMap<Vec<u8>, StoredValue>,
    expiry: ExpiryIndex,
}

impl Tables {
    fn insert(&mut self, key: &[u8], value: StoredValue) {
        if let Some(deadline) = value.expires_at() {
            self.expiry.insert(deadline, key.to_vec());
        }
        if let Some(old) = self.entries.insert(key.to_vec(), value) {
            self.unindex(key, &old);
        }
    }

    fn remove(&mut self, key: &[u8]) {
        if let Some(old) = self.entries.remove(key) {
            self.unindex(key, &old);
        }
    }

    fn unindex(&mut self, key: &[u8], old: &StoredValue) {
        if let Some(deadline) = old.expires_at() {
            // A rewrite with the same deadline keeps its index entry
            let still_indexed = self
                .entries
                .get(key)
                .map_or(false, |current| current.expires_at() == Some(deadline));
            if !still_indexed {
                self.expiry.remove(deadline, key);
            }
        }
    }
}

/// Ordered in-memory key-value map
#[derive(Debug, Default)]
pub struct OrderedStore {
    data: RwLock<Tables>,
    version: AtomicU64,
}

impl OrderedStore {
    /// Create a new empty store at version 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Point lookup, skipping expired entries
    pub fn get(&self, key: &[u8]) -> Option<StoredValue> {
        self.read().get(key).cloned()
    }

    /// Batched point lookup under a single read lock
    ///
    /// Results are in input order.
    pub fn get_many(&self, keys: &[Vec<u8>]) -> Vec<Option<StoredValue>> {
        let guard = self.read();
        keys.iter().map(|k| guard.get(k).cloned()).collect()
    }

    /// One page of the half-open interval `[start, end)`
    ///
    /// Returns at most `limit` live entries, ascending or descending. An empty
    /// or inverted interval yields nothing.
    pub fn scan(
        &self,
        start: &[u8],
        end: &[u8],
        reverse: bool,
        limit: usize,
    ) -> Vec<(Vec<u8>, StoredValue)> {
        if start >= end || limit == 0 {
            return Vec::new();
        }
        let now = now_millis();
        let data = self.data.read();
        let range = data.entries.range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)));
        let live = |(_, sv): &(&Vec<u8>, &StoredValue)| !sv.is_expired_at(now);
        let clone = |(k, sv): (&Vec<u8>, &StoredValue)| (k.clone(), sv.clone());

        if reverse {
            range.rev().filter(live).take(limit).map(clone).collect()
        } else {
            range.filter(live).take(limit).map(clone).collect()
        }
    }

    /// Apply a resolved write set and advance the version watermark
    pub fn apply(&self, ops: &[WriteOp], version: u64) {
        self.write().apply(ops, version);
    }

    /// Acquire a consistent read view
    pub fn read(&self) -> StoreReadGuard<'_> {
        StoreReadGuard {
            data: self.data.read(),
            now: now_millis(),
        }
    }

    /// Acquire exclusive access for applying a commit
    pub fn write(&self) -> StoreWriteGuard<'_> {
        StoreWriteGuard {
            data: self.data.write(),
            version: &self.version,
        }
    }

    /// Highest applied commit version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Up to `limit` stored keys whose deadline passed at `now`
    ///
    /// These keys already read as absent; deleting them reclaims the space.
    pub fn expired_keys(&self, now: u64, limit: usize) -> Vec<Vec<u8>> {
        self.data.read().expiry.find_expired(now, limit)
    }

    /// Number of stored entries carrying a deadline
    pub fn expiring_len(&self) -> usize {
        self.data.read().expiry.len()
    }

    /// Number of stored entries, including expired ones not yet removed
    pub fn len(&self) -> usize {
        self.data.read().entries.len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.data.read().entries.is_empty()
    }
}

/// Shared read access to the store
pub struct StoreReadGuard<'a> {
    data: RwLockReadGuard<'a, Tables>,
    now: u64,
}

impl<'a> StoreReadGuard<'a> {
    /// Live entry for `key`, as of when the guard was taken
    pub fn get(&self, key: &[u8]) -> Option<&StoredValue> {
        self.data.entries.get(key).filter(|sv| !sv.is_expired_at(self.now))
    }

    /// True if `key` is stored but past its deadline
    pub fn is_expired(&self, key: &[u8]) -> bool {
        self.data
            .entries
            .get(key)
            .map_or(false, |sv| sv.is_expired_at(self.now))
    }
}

/// Exclusive write access to the store
pub struct StoreWriteGuard<'a> {
    data: RwLockWriteGuard<'a, Tables>,
    version: &'a AtomicU64,
}

impl<'a> StoreWriteGuard<'a> {
    /// Highest applied commit version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Apply every op under this guard, then raise the watermark to `version`
    pub fn apply(&mut self, ops: &[WriteOp], version: u64) {
        for op in ops {
            match op {
                WriteOp::Put {
                    key,
                    value,
                    expires_at,
                } => {
                    self.data
                        .insert(key, StoredValue::new(value.as_slice(), version, *expires_at));
                }
                WriteOp::Delete { key } => {
                    self.data.remove(key);
                }
            }
        }
        self.version.fetch_max(version, Ordering::SeqCst);
        trace!(target: "stratakv::store", version, ops = ops.len(), "Applied write set");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &[u8], value: &[u8]) -> WriteOp {
        WriteOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
            expires_at: None,
        }
    }

    fn keys(page: &[(Vec<u8>, StoredValue)]) -> Vec<Vec<u8>> {
        page.iter().map(|(k, _)| k.clone()).collect()
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = OrderedStore::new();
        assert!(store.is_empty());
        assert_eq!(store.current_version(), 0);
        assert!(store.get(b"a").is_none());
    }

    #[test]
    fn test_apply_and_get() {
        let store = OrderedStore::new();
        store.apply(&[put(b"a", b"1"), put(b"b", b"2")], 1);

        let sv = store.get(b"a").unwrap();
        assert_eq!(sv.bytes(), b"1");
        assert_eq!(sv.version(), 1);
        assert_eq!(store.current_version(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_apply_delete() {
        let store = OrderedStore::new();
        store.apply(&[put(b"a", b"1")], 1);
        store.apply(&[WriteOp::Delete { key: b"a".to_vec() }], 2);
        assert!(store.get(b"a").is_none());
        assert_eq!(store.current_version(), 2);
    }

    #[test]
    fn test_watermark_never_decreases() {
        let store = OrderedStore::new();
        store.apply(&[put(b"a", b"1")], 5);
        store.apply(&[put(b"b", b"1")], 3);
        assert_eq!(store.current_version(), 5);
    }

    #[test]
    fn test_get_many_preserves_order() {
        let store = OrderedStore::new();
        store.apply(&[put(b"a", b"1"), put(b"c", b"3")], 1);
        let got = store.get_many(&[b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
        assert_eq!(got[0].as_ref().unwrap().bytes(), b"3");
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap().bytes(), b"1");
    }

    #[test]
    fn test_scan_forward_and_reverse() {
        let store = OrderedStore::new();
        store.apply(
            &[put(b"a", b""), put(b"b", b""), put(b"c", b""), put(b"d", b"")],
            1,
        );
        assert_eq!(
            keys(&store.scan(b"b", b"d", false, 10)),
            vec![b"b".to_vec(), b"c".to_vec()]
        );
        assert_eq!(
            keys(&store.scan(b"a", b"z", true, 2)),
            vec![b"d".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn test_scan_empty_and_inverted_interval() {
        let store = OrderedStore::new();
        store.apply(&[put(b"a", b"")], 1);
        assert!(store.scan(b"a", b"a", false, 10).is_empty());
        assert!(store.scan(b"z", b"a", false, 10).is_empty());
        assert!(store.scan(b"a", b"z", false, 0).is_empty());
    }

    #[test]
    fn test_expired_entries_are_invisible() {
        let store = OrderedStore::new();
        store.apply(
            &[
                WriteOp::Put {
                    key: b"gone".to_vec(),
                    value: b"x".to_vec(),
                    expires_at: Some(1),
                },
                put(b"kept", b"y"),
            ],
            1,
        );
        assert!(store.get(b"gone").is_none());
        assert!(store.read().get(b"gone").is_none());
        assert_eq!(keys(&store.scan(b"a", b"z", false, 10)), vec![b"kept".to_vec()]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_expiry_index_follows_writes() {
        let store = OrderedStore::new();
        let expiring = |key: &[u8], deadline: u64| WriteOp::Put {
            key: key.to_vec(),
            value: b"x".to_vec(),
            expires_at: Some(deadline),
        };
        store.apply(&[expiring(b"a", 10), expiring(b"b", 20), put(b"c", b"")], 1);
        assert_eq!(store.expiring_len(), 2);
        assert_eq!(store.expired_keys(15, 10), vec![b"a".to_vec()]);

        // Same deadline rewritten, then a new deadline, then no deadline
        store.apply(&[expiring(b"a", 10)], 2);
        assert_eq!(store.expired_keys(15, 10), vec![b"a".to_vec()]);
        store.apply(&[expiring(b"a", 30)], 3);
        assert!(store.expired_keys(15, 10).is_empty());
        store.apply(&[put(b"a", b"")], 4);
        assert_eq!(store.expiring_len(), 1);

        store.apply(&[WriteOp::Delete { key: b"b".to_vec() }], 5);
        assert_eq!(store.expiring_len(), 0);
        assert!(store.expired_keys(u64::MAX, 10).is_empty());
    }

    #[test]
    fn test_read_guard_reports_expired_entries() {
        let store = OrderedStore::new();
        store.apply(
            &[
                WriteOp::Put {
                    key: b"gone".to_vec(),
                    value: b"x".to_vec(),
                    expires_at: Some(1),
                },
                put(b"kept", b"y"),
            ],
            1,
        );
        let view = store.read();
        assert!(view.is_expired(b"gone"));
        assert!(!view.is_expired(b"kept"));
        assert!(!view.is_expired(b"missing"));
    }

    #[test]
    fn test_write_guard_blocks_readers_until_dropped() {
        let store = OrderedStore::new();
        {
            let mut guard = store.write();
            guard.apply(&[put(b"a", b"1")], 1);
            guard.apply(&[put(b"b", b"2")], 2);
            assert_eq!(guard.current_version(), 2);
        }
        assert_eq!(store.len(), 2);
    }
}
