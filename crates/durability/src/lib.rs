//! Durability layer for StrataKV
//!
//! This crate handles everything that touches disk:
//!
//! - Commit log: one append-only file per path-backed database, one record
//!   per committed batch
//! - Durability modes: Always (default), Buffered
//! - Recovery: replay of intact records, truncation of a torn tail

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod record;
pub mod wal;

pub use record::{CommitRecord, LoggedWrite, RecordError, RECORD_HEADER_SIZE};
pub use wal::{CommitLog, DurabilityMode, Recovery, WalCounters};
