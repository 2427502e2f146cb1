//! Striped key locks
//!
//! Commits serialize per key, not globally. Every encoded key hashes to one
//! of N stripes; a commit locks the stripes of all keys it checks or mutates,
//! always in ascending stripe order, so two commits can never wait on each
//! other in a cycle. Commits over disjoint stripes proceed in parallel.

use std::hash::{Hash, Hasher};

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHasher;

/// Default number of stripes
pub const DEFAULT_LOCK_STRIPES: usize = 64;

/// Fixed-size table of key-hashed mutexes
pub struct KeyLockTable {
    stripes: Box<[Mutex<()>]>,
}

impl KeyLockTable {
    /// Create a table with `stripes` locks (at least one)
    pub fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        KeyLockTable { stripes }
    }

    /// Number of stripes
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Stripe index of an encoded key
    pub fn stripe_for(&self, key: &[u8]) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Lock the stripes of every key, in ascending stripe order
    ///
    /// Duplicate keys and keys sharing a stripe lock it once.
    pub fn lock_keys<'k, I>(&self, keys: I) -> KeyLockGuard<'_>
    where
        I: IntoIterator<Item = &'k [u8]>,
    {
        let mut indices: Vec<usize> = keys.into_iter().map(|k| self.stripe_for(k)).collect();
        indices.sort_unstable();
        indices.dedup();

        let guards = indices.iter().map(|&i| self.stripes[i].lock()).collect();
        KeyLockGuard {
            _guards: guards,
            stripes: indices,
        }
    }
}

impl Default for KeyLockTable {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_STRIPES)
    }
}

/// Held stripes; released on drop
pub struct KeyLockGuard<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
    stripes: Vec<usize>,
}

impl<'a> KeyLockGuard<'a> {
    /// Stripe indices held, ascending
    pub fn stripes(&self) -> &[usize] {
        &self.stripes
    }
}
