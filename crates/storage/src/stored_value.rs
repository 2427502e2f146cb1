//! Storage-layer entry with expiry support
//!
//! The store keeps values in serialized form; decoding into a value graph
//! happens at the engine boundary. Expiry is a storage concern: an entry past
//! its deadline is treated as absent by every read path, and is physically
//! removed when overwritten, deleted or purged.

use std::sync::Arc;

use stratakv_core::{now_millis, Versionstamp};

/// A stored value: serialized bytes, commit version and optional deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    bytes: Arc<[u8]>,
    version: u64,
    expires_at: Option<u64>,
}

impl StoredValue {
    /// Create a stored value
    pub fn new(bytes: impl Into<Arc<[u8]>>, version: u64, expires_at: Option<u64>) -> Self {
        StoredValue {
            bytes: bytes.into(),
            version,
            expires_at,
        }
    }

    /// Serialized value bytes
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Commit version that wrote this entry
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Versionstamp of the commit that wrote this entry
    #[inline]
    pub fn versionstamp(&self) -> Versionstamp {
        Versionstamp::from_version(self.version)
    }

    /// Expiry deadline in milliseconds since the epoch
    #[inline]
    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// Check if this value has expired at `now` (ms since epoch)
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }

    /// Check if this value has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}
