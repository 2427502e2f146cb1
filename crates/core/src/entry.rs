//! Read projections returned to callers

use crate::key::Key;
use crate::value::Value;
use crate::versionstamp::Versionstamp;
use std::time::{SystemTime, UNIX_EPOCH};

/// A present entry: key, value and the versionstamp of the commit that wrote it
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    /// The entry's key
    pub key: Key,
    /// The stored value
    pub value: Value,
    /// Versionstamp of the last write to this key
    pub versionstamp: Versionstamp,
}

/// The result of a point read
///
/// An absent key has both `value` and `versionstamp` set to `None`; the two
/// are always either both present or both absent.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntryMaybe {
    /// The requested key
    pub key: Key,
    /// The stored value, if the key exists
    pub value: Option<Value>,
    /// Versionstamp of the last write, if the key exists
    pub versionstamp: Option<Versionstamp>,
}

impl KvEntryMaybe {
    /// Projection of a missing key
    pub fn absent(key: Key) -> Self {
        KvEntryMaybe {
            key,
            value: None,
            versionstamp: None,
        }
    }

    /// True if the key exists
    pub fn is_present(&self) -> bool {
        self.versionstamp.is_some()
    }
}

impl From<KvEntry> for KvEntryMaybe {
    fn from(entry: KvEntry) -> Self {
        KvEntryMaybe {
            key: entry.key,
            value: Some(entry.value),
            versionstamp: Some(entry.versionstamp),
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch
///
/// Used for expiry deadlines. A clock before the epoch reads as 0.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
