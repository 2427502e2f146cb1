//! Database configuration via TOML
//!
//! A [`DatabaseConfig`] can be built in code, parsed from a TOML string, or
//! loaded from a file. Every field has a default, so an empty document is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stratakv_concurrency::DEFAULT_LOCK_STRIPES;
use stratakv_core::limits::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
use stratakv_core::{KvError, KvResult, Limits};
use stratakv_durability::DurabilityMode;

/// Default interval between background expiry purges
pub const DEFAULT_EXPIRY_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Database configuration
///
/// # Example
///
/// ```toml
/// # Durability mode: "always" (default) or "buffered"
/// # "always"   = fsync every commit, zero data loss
/// # "buffered" = leave flushing to the OS; fsync on close
/// durability = "always"
///
/// # Number of striped commit locks
/// lock_stripes = 64
///
/// # Page size of list scans without an explicit batch size (max 1000)
/// default_batch_size = 500
///
/// # Milliseconds between background purges of expired entries; 0 disables
/// expiry_sweep_interval_ms = 60000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Commit log sync policy (path-backed stores only)
    pub durability: DurabilityMode,
    /// Number of striped commit locks
    pub lock_stripes: usize,
    /// Page size of list scans without an explicit batch size
    pub default_batch_size: usize,
    /// Milliseconds between background purges of expired entries, 0 to disable
    pub expiry_sweep_interval_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            durability: DurabilityMode::default(),
            lock_stripes: DEFAULT_LOCK_STRIPES,
            default_batch_size: DEFAULT_BATCH_SIZE,
            expiry_sweep_interval_ms: DEFAULT_EXPIRY_SWEEP_INTERVAL_MS,
        }
    }
}

impl DatabaseConfig {
    /// Parse a configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns a type error if the document is malformed or names an unknown
    /// durability mode.
    pub fn from_toml_str(content: &str) -> KvResult<Self> {
        toml::from_str(content)
            .map_err(|e| KvError::type_error(format!("Failed to parse config: {}", e)))
    }

    /// Read and parse a configuration file
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a type error if it
    /// cannot be parsed.
    pub fn from_file(path: &Path) -> KvResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            KvError::type_error(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Serialize this config to TOML
    pub fn to_toml_string(&self) -> KvResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| KvError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Interval of the background expiry sweeper, `None` when disabled
    pub fn expiry_sweep_interval(&self) -> Option<Duration> {
        match self.expiry_sweep_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Size limits implied by this config
    ///
    /// The default batch size is clamped to `1..=1000`.
    pub fn limits(&self) -> Limits {
        Limits {
            default_batch_size: self.default_batch_size.clamp(1, MAX_BATCH_SIZE),
            ..Limits::default()
        }
    }
}
