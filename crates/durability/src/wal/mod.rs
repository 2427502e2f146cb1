//! Commit log module
//!
//! - `mode`: durability modes (Always, Buffered)
//! - `writer`: single-file commit log with recovery (CommitLog)

pub mod mode;
pub mod writer;

pub use mode::DurabilityMode;
pub use writer::{CommitLog, Recovery, WalCounters};
