//! Durability mode configuration
//!
//! Controls when the commit log is fsynced (Always, Buffered).

use serde::{Deserialize, Serialize};

/// Durability mode for path-backed stores
///
/// # Modes
///
/// | Mode | fsync | Data Loss Window |
/// |------|-------|-----------------|
/// | Always | Every commit | Zero |
/// | Buffered | On close and explicit sync | Whatever the OS has not flushed |
///
/// In-memory stores have no log and ignore the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityMode {
    /// fsync after every commit (the default)
    #[default]
    Always,
    /// Write every commit, leave flushing to the OS
    Buffered,
}

impl DurabilityMode {
    /// Check if this mode requires immediate fsync on every commit
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Always => "Always sync (safest, slowest)",
            DurabilityMode::Buffered => "Buffered (OS-flushed, faster)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_always() {
        assert_eq!(DurabilityMode::default(), DurabilityMode::Always);
        assert!(DurabilityMode::Always.requires_immediate_fsync());
        assert!(!DurabilityMode::Buffered.requires_immediate_fsync());
    }

    #[test]
    fn test_serde_names() {
        let bytes = rmp_serde::to_vec(&DurabilityMode::Buffered).unwrap();
        let name: String = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(name, "buffered");
        let mode: DurabilityMode = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(mode, DurabilityMode::Buffered);
    }
}
