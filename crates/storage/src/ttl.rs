//! Expiry index for reclaiming expired entries
//!
//! Maps deadline → keys so the keys due at `now` are found with one range
//! query instead of a scan of the whole store. The index only locates
//! candidates; removal goes through a normal logged delete.

use std::collections::{BTreeMap, BTreeSet};

/// Expiry index: deadline (ms since epoch) → encoded keys
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    index: BTreeMap<u64, BTreeSet<Vec<u8>>>,
}

impl ExpiryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` expires at `deadline`
    pub fn insert(&mut self, deadline: u64, key: Vec<u8>) {
        self.index.entry(deadline).or_default().insert(key);
    }

    /// Forget `key` at `deadline`, dropping the deadline once it has no keys
    pub fn remove(&mut self, deadline: u64, key: &[u8]) {
        if let Some(keys) = self.index.get_mut(&deadline) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(&deadline);
            }
        }
    }

    /// Up to `limit` keys whose deadline is at or before `now`, earliest first
    pub fn find_expired(&self, now: u64, limit: usize) -> Vec<Vec<u8>> {
        self.index
            .range(..=now)
            .flat_map(|(_, keys)| keys.iter().cloned())
            .take(limit)
            .collect()
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.index.values().map(BTreeSet::len).sum()
    }

    /// True if no key has a deadline
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
