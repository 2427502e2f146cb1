//! Check validation
//!
//! A check compares the versionstamp a caller expects against the one the
//! key currently has. `None` on either side means "absent"; an expired entry
//! counts as absent. Validation runs under the key stripes of the batch and
//! a store read guard, so the result still holds when the batch applies.

use stratakv_core::{encode_key, Key, KvResult, Limits, Versionstamp};
use stratakv_storage::StoreReadGuard;

use crate::atomic::Check;

/// A check with its key encoded and size-validated
#[derive(Debug, Clone)]
pub struct PreparedCheck {
    /// Logical key
    pub key: Key,
    /// Encoded key
    pub encoded: Vec<u8>,
    /// Expected versionstamp
    pub expected: Option<Versionstamp>,
}

/// Encode and size-check every check against the read-path key limit
pub fn prepare_checks(checks: &[Check], limits: &Limits) -> KvResult<Vec<PreparedCheck>> {
    checks
        .iter()
        .map(|check| -> KvResult<PreparedCheck> {
            let encoded = encode_key(&check.key)?;
            limits.validate_read_key(&encoded)?;
            Ok(PreparedCheck {
                key: check.key.clone(),
                encoded,
                expected: check.versionstamp,
            })
        })
        .collect()
}

/// Why a check failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// Current versionstamp differs from the expected one
    VersionMismatch {
        /// The checked key
        key: Key,
        /// Versionstamp the caller expected (`None`: absent)
        expected: Option<Versionstamp>,
        /// Versionstamp found (`None`: absent)
        actual: Option<Versionstamp>,
    },
}

/// Result of validating a batch's checks
///
/// Accumulates all conflicts found; a batch commits only if
/// [`is_valid`](Self::is_valid) returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        Self::default()
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

/// Evaluate every check against the store
pub fn validate_checks(checks: &[PreparedCheck], store: &StoreReadGuard<'_>) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for check in checks {
        let actual = store.get(&check.encoded).map(|sv| sv.versionstamp());
        if actual != check.expected {
            result.conflicts.push(ConflictType::VersionMismatch {
                key: check.key.clone(),
                expected: check.expected,
                actual,
            });
        }
    }
    result
}
