//! Parsing of database locations

use std::path::PathBuf;
use stratakv_core::{KvError, KvResult};

/// Location string of an ephemeral in-memory database
pub const MEMORY_LOCATION: &str = ":memory:";

/// Where a database keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Ephemeral; discarded on close
    Memory,
    /// Commit log file, created if missing
    Path(PathBuf),
}

impl Location {
    /// Parse a location string
    ///
    /// `":memory:"` is ephemeral. The empty string and any other string
    /// starting with `:` are rejected; everything else is a file path.
    pub fn parse(location: &str) -> KvResult<Self> {
        if location.is_empty() {
            return Err(KvError::type_error("Database location must not be empty"));
        }
        if location == MEMORY_LOCATION {
            return Ok(Location::Memory);
        }
        if location.starts_with(':') {
            return Err(KvError::type_error(format!(
                "Invalid database location '{}': only ':memory:' may start with ':'",
                location
            )));
        }
        Ok(Location::Path(PathBuf::from(location)))
    }

    /// True for the in-memory location
    pub fn is_memory(&self) -> bool {
        matches!(self, Location::Memory)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Memory => f.write_str(MEMORY_LOCATION),
            Location::Path(path) => write!(f, "{}", path.display()),
        }
    }
}
