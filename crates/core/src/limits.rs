//! Size limits for keys, values, reads and atomic batches
//!
//! All limits are checked synchronously, before any storage access, so a
//! violation never leaves a partial mutation behind.
//!
//! | Limit | Default |
//! |-------|---------|
//! | encoded key (write path) | 2048 bytes |
//! | encoded key (read path) | 2049 bytes |
//! | serialized value | 65536 bytes |
//! | keys per `get_many` | 10 |
//! | checks per atomic batch | 10 |
//! | mutations per atomic batch | 10 |
//! | list batch size | 500 default, 1000 max |
//! | total mutation payload | 819200 bytes |
//!
//! The read path allows one extra byte so that range boundaries such as
//! `prefix ++ 0xFF` built from a maximum-size write key remain valid.

use thiserror::Error;

/// Maximum encoded key size accepted on the write path
pub const MAX_WRITE_KEY_BYTES: usize = 2048;
/// Maximum encoded key size accepted on the read path
pub const MAX_READ_KEY_BYTES: usize = MAX_WRITE_KEY_BYTES + 1;
/// Maximum serialized value size
pub const MAX_VALUE_BYTES: usize = 65536;
/// Maximum number of keys in one `get_many` call
pub const MAX_READ_KEYS: usize = 10;
/// Maximum number of checks in one atomic batch
pub const MAX_CHECKS: usize = 10;
/// Maximum number of mutations in one atomic batch
pub const MAX_MUTATIONS: usize = 10;
/// Batch size used by list scans when neither a batch size nor a limit is given
pub const DEFAULT_BATCH_SIZE: usize = 500;
/// Hard ceiling on list batch size
pub const MAX_BATCH_SIZE: usize = 1000;
/// Maximum sum of key and value bytes across the mutations of one commit
pub const MAX_TOTAL_MUTATION_BYTES: usize = 800 * 1024;

/// Size limits enforced by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum encoded key size for writes and checks on written keys
    pub max_write_key_bytes: usize,
    /// Maximum encoded key size for reads and range boundaries
    pub max_read_key_bytes: usize,
    /// Maximum serialized value size
    pub max_value_bytes: usize,
    /// Maximum keys per `get_many`
    pub max_read_keys: usize,
    /// Maximum checks per atomic batch
    pub max_checks: usize,
    /// Maximum mutations per atomic batch
    pub max_mutations: usize,
    /// Default list batch size
    pub default_batch_size: usize,
    /// Maximum list batch size
    pub max_batch_size: usize,
    /// Maximum total mutation payload per commit
    pub max_total_mutation_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_write_key_bytes: MAX_WRITE_KEY_BYTES,
            max_read_key_bytes: MAX_READ_KEY_BYTES,
            max_value_bytes: MAX_VALUE_BYTES,
            max_read_keys: MAX_READ_KEYS,
            max_checks: MAX_CHECKS,
            max_mutations: MAX_MUTATIONS,
            default_batch_size: DEFAULT_BATCH_SIZE,
            max_batch_size: MAX_BATCH_SIZE,
            max_total_mutation_bytes: MAX_TOTAL_MUTATION_BYTES,
        }
    }
}

impl Limits {
    /// Validate the encoded size of a key about to be written
    pub fn validate_write_key(&self, encoded: &[u8]) -> Result<(), LimitError> {
        if encoded.len() > self.max_write_key_bytes {
            return Err(LimitError::KeyTooLargeForWrite {
                actual: encoded.len(),
                max: self.max_write_key_bytes,
            });
        }
        Ok(())
    }

    /// Validate the encoded size of a key used for reading
    pub fn validate_read_key(&self, encoded: &[u8]) -> Result<(), LimitError> {
        if encoded.len() > self.max_read_key_bytes {
            return Err(LimitError::KeyTooLargeForRead {
                actual: encoded.len(),
                max: self.max_read_key_bytes,
            });
        }
        Ok(())
    }

    /// Validate a serialized value size
    pub fn validate_value(&self, serialized: &[u8]) -> Result<(), LimitError> {
        if serialized.len() > self.max_value_bytes {
            return Err(LimitError::ValueTooLarge {
                actual: serialized.len(),
                max: self.max_value_bytes,
            });
        }
        Ok(())
    }

    /// Validate the number of keys in a batched read
    pub fn validate_read_count(&self, count: usize) -> Result<(), LimitError> {
        if count > self.max_read_keys {
            return Err(LimitError::TooManyReadKeys {
                max: self.max_read_keys,
            });
        }
        Ok(())
    }

    /// Validate the shape of an atomic batch
    ///
    /// Checks and mutations are counted independently.
    pub fn validate_batch_shape(&self, checks: usize, mutations: usize) -> Result<(), LimitError> {
        if checks > self.max_checks {
            return Err(LimitError::TooManyChecks {
                max: self.max_checks,
            });
        }
        if mutations > self.max_mutations {
            return Err(LimitError::TooManyMutations {
                max: self.max_mutations,
            });
        }
        Ok(())
    }

    /// Validate the accumulated key + value payload of a commit
    pub fn validate_total_mutation_bytes(&self, total: usize) -> Result<(), LimitError> {
        if total > self.max_total_mutation_bytes {
            return Err(LimitError::TotalMutationTooLarge {
                actual: total,
                max: self.max_total_mutation_bytes,
            });
        }
        Ok(())
    }

    /// Resolve the page size of a list scan
    ///
    /// An explicit batch size must be in `1..=max_batch_size`. Otherwise the
    /// batch size follows `limit`, clamped to `default_batch_size`.
    pub fn resolve_batch_size(
        &self,
        batch_size: Option<usize>,
        limit: Option<usize>,
    ) -> Result<usize, LimitError> {
        match batch_size {
            Some(0) => Err(LimitError::ZeroBatchSize),
            Some(n) if n > self.max_batch_size => Err(LimitError::BatchTooLarge {
                actual: n,
                max: self.max_batch_size,
            }),
            Some(n) => Ok(n),
            None => Ok(limit
                .unwrap_or(self.default_batch_size)
                .clamp(1, self.default_batch_size)),
        }
    }
}

/// Limit validation errors
///
/// All of these surface to callers as type errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// Encoded key exceeds the write-path maximum
    #[error("Key too large for write (max {max} bytes, got {actual})")]
    KeyTooLargeForWrite {
        /// Encoded key length
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Encoded key exceeds the read-path maximum
    #[error("Key too large for read (max {max} bytes, got {actual})")]
    KeyTooLargeForRead {
        /// Encoded key length
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Serialized value exceeds the maximum
    #[error("Value too large (max {max} bytes, got {actual})")]
    ValueTooLarge {
        /// Serialized length
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Too many keys in one batched read
    #[error("Too many keys in get_many (max {max})")]
    TooManyReadKeys {
        /// Maximum allowed keys
        max: usize,
    },

    /// Too many checks in one atomic batch
    #[error("Too many checks (max {max})")]
    TooManyChecks {
        /// Maximum allowed checks
        max: usize,
    },

    /// Too many mutations in one atomic batch
    #[error("Too many mutations (max {max})")]
    TooManyMutations {
        /// Maximum allowed mutations
        max: usize,
    },

    /// Requested list batch size is above the ceiling
    #[error("Too many entries per batch (max {max}, got {actual})")]
    BatchTooLarge {
        /// Requested batch size
        actual: usize,
        /// Maximum batch size
        max: usize,
    },

    /// Requested list batch size is zero
    #[error("Batch size must be greater than zero")]
    ZeroBatchSize,

    /// Total mutation payload of one commit is too large
    #[error("Total mutation size too large (max {max} bytes, got {actual})")]
    TotalMutationTooLarge {
        /// Accumulated payload
        actual: usize,
        /// Maximum payload
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_write_key_bytes, 2048);
        assert_eq!(limits.max_read_key_bytes, 2049);
        assert_eq!(limits.max_value_bytes, 65536);
        assert_eq!(limits.max_read_keys, 10);
        assert_eq!(limits.max_checks, 10);
        assert_eq!(limits.max_mutations, 10);
        assert_eq!(limits.max_batch_size, 1000);
    }

    #[test]
    fn test_write_key_boundary() {
        let limits = Limits::default();
        assert!(limits.validate_write_key(&vec![1u8; 2048]).is_ok());
        assert!(matches!(
            limits.validate_write_key(&vec![1u8; 2049]),
            Err(LimitError::KeyTooLargeForWrite { actual: 2049, max: 2048 })
        ));
    }

    #[test]
    fn test_read_key_has_one_byte_slack() {
        let limits = Limits::default();
        assert!(limits.validate_read_key(&vec![1u8; 2049]).is_ok());
        assert!(matches!(
            limits.validate_read_key(&vec![1u8; 2050]),
            Err(LimitError::KeyTooLargeForRead { .. })
        ));
    }

    #[test]
    fn test_read_and_write_messages_differ() {
        let limits = Limits::default();
        let w = limits.validate_write_key(&vec![0u8; 4096]).unwrap_err();
        let r = limits.validate_read_key(&vec![0u8; 4096]).unwrap_err();
        assert!(w.to_string().contains("for write"));
        assert!(r.to_string().contains("for read"));
    }

    #[test]
    fn test_value_boundary() {
        let limits = Limits::default();
        assert!(limits.validate_value(&vec![0u8; 65536]).is_ok());
        assert!(limits.validate_value(&vec![0u8; 65537]).is_err());
    }

    #[test]
    fn test_read_count() {
        let limits = Limits::default();
        assert!(limits.validate_read_count(10).is_ok());
        assert_eq!(
            limits.validate_read_count(11),
            Err(LimitError::TooManyReadKeys { max: 10 })
        );
    }

    #[test]
    fn test_batch_shape_counts_independently() {
        let limits = Limits::default();
        assert!(limits.validate_batch_shape(10, 10).is_ok());
        assert!(matches!(
            limits.validate_batch_shape(11, 0),
            Err(LimitError::TooManyChecks { .. })
        ));
        assert!(matches!(
            limits.validate_batch_shape(0, 11),
            Err(LimitError::TooManyMutations { .. })
        ));
    }

    #[test]
    fn test_resolve_batch_size() {
        let limits = Limits::default();
        assert_eq!(limits.resolve_batch_size(None, None), Ok(500));
        assert_eq!(limits.resolve_batch_size(None, Some(2)), Ok(2));
        assert_eq!(limits.resolve_batch_size(None, Some(5000)), Ok(500));
        assert_eq!(limits.resolve_batch_size(None, Some(0)), Ok(1));
        assert_eq!(limits.resolve_batch_size(Some(1000), Some(2)), Ok(1000));
        assert_eq!(
            limits.resolve_batch_size(Some(1001), None),
            Err(LimitError::BatchTooLarge {
                actual: 1001,
                max: 1000
            })
        );
        assert_eq!(
            limits.resolve_batch_size(Some(0), None),
            Err(LimitError::ZeroBatchSize)
        );
    }

    #[test]
    fn test_total_mutation_bytes() {
        let limits = Limits::default();
        assert!(limits.validate_total_mutation_bytes(819_200).is_ok());
        assert!(limits.validate_total_mutation_bytes(819_201).is_err());
    }
}
