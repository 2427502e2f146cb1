//! Database engine for StrataKV
//!
//! This crate orchestrates all lower layers:
//! - Database: the handle with open/close, reads, writes and scans
//! - Commit coordination and metrics
//! - Background purging of expired entries
//! - List scans with cursor-based resumption
//! - Configuration and location parsing
//!
//! The engine is the only component that knows about:
//! - The lifecycle of a handle (open, closed)
//! - Cross-layer wiring (store + commit log + replay)
//! - Turning stored bytes back into keys, values and entries

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod cursor;
pub mod database;
pub mod expiry;
pub mod list;

pub use coordinator::{CommitCoordinator, CommitMetrics};
pub use cursor::{decode_cursor, encode_cursor};
pub use database::{Database, DatabaseConfig, Location, MEMORY_LOCATION};
pub use expiry::{purge_all, ExpirySweeper, PURGE_BATCH_SIZE};
pub use list::{ListIterator, ListOptions, ListSelector, PageSource, ResolvedRange};
