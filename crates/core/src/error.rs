//! Error types for StrataKV
//!
//! Every fallible operation in the workspace returns [`KvResult`]. Errors fall
//! into a small number of categories (see [`ErrorCategory`]):
//!
//! - **Type**: the caller misused the API (bad key shape, oversized value,
//!   malformed selector, cursor or versionstamp, sum/min/max type mismatch).
//!   Always raised before any mutation.
//! - **Decode**: stored or supplied bytes could not be decoded.
//! - **Closed**: the database handle was closed.
//! - **Storage**: I/O or log corruption in a path-backed store.
//!
//! A failed atomic check is *not* an error; it is reported through the
//! commit result so callers can tell a lost race from a misuse.

use crate::limits::LimitError;
use std::io;
use thiserror::Error;

/// Result type alias for StrataKV operations
pub type KvResult<T> = std::result::Result<T, KvError>;

/// Coarse classification of a [`KvError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Validation and type errors, including size limits
    Type,
    /// Malformed encoded data
    Decode,
    /// Operation on a closed database
    Closed,
    /// I/O or persisted-state corruption
    Storage,
}

/// Error types for the key-value store
#[derive(Debug, Error)]
pub enum KvError {
    /// Invalid argument shape or type mismatch
    #[error("TypeError: {0}")]
    Type(String),

    /// A configured size limit was exceeded
    #[error("TypeError: {0}")]
    SizeLimit(#[from] LimitError),

    /// Encoded key, value or cursor bytes are malformed
    #[error("Decode error: {0}")]
    Decode(String),

    /// The database handle has been closed
    #[error("Database is closed")]
    Closed,

    /// I/O error from a path-backed store
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted state failed validation
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Record serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl KvError {
    /// Build a [`KvError::Type`] from any displayable message
    pub fn type_error(msg: impl Into<String>) -> Self {
        KvError::Type(msg.into())
    }

    /// Build a [`KvError::Decode`] from any displayable message
    pub fn decode(msg: impl Into<String>) -> Self {
        KvError::Decode(msg.into())
    }

    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            KvError::Type(_) | KvError::SizeLimit(_) => ErrorCategory::Type,
            KvError::Decode(_) => ErrorCategory::Decode,
            KvError::Closed => ErrorCategory::Closed,
            KvError::Io(_) | KvError::Corruption(_) | KvError::Serialization(_) => {
                ErrorCategory::Storage
            }
        }
    }

    /// True for validation failures (type errors and size limits)
    pub fn is_type_error(&self) -> bool {
        self.category() == ErrorCategory::Type
    }

    /// True if a size limit was exceeded
    pub fn is_size_limit(&self) -> bool {
        matches!(self, KvError::SizeLimit(_))
    }
}
