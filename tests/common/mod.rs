//! Shared test utilities for the integration test suites.
//!
//! Import from a test's main.rs with `#[path = "../common/mod.rs"] mod common;`.

#![allow(dead_code)]

use std::sync::Once;
pub use stratakv::{Database, DatabaseConfig, Key, KeyPart, KvU64, ListOptions, ListSelector, Value};
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

// ============================================================================
// Databases
// ============================================================================

/// A fresh in-memory database
pub fn memory_db() -> Database {
    init_tracing();
    Database::open(":memory:").expect("open in-memory database")
}

/// A path-backed database in a temporary directory
///
/// Keep the `TempDir` alive for as long as the database, and reopen with
/// [`reopen`].
pub fn disk_db() -> (Database, TempDir, String) {
    init_tracing();
    let dir = TempDir::new().expect("create temp dir");
    let location = dir.path().join("kv.log").to_string_lossy().into_owned();
    let db = Database::open(&location).expect("open path-backed database");
    (db, dir, location)
}

/// Close `db` and open the same location again
pub fn reopen(db: Database, location: &str) -> Database {
    db.close().expect("close database");
    drop(db);
    Database::open(location).expect("reopen database")
}

// ============================================================================
// Keys and values
// ============================================================================

/// A key of string parts
pub fn key(parts: &[&str]) -> Key {
    Key::new(parts.iter().map(|p| KeyPart::from(*p)).collect())
}

/// Read a `KvU64` counter, panicking if absent or of another type
pub fn read_counter(db: &Database, k: &Key) -> u64 {
    db.get(k)
        .expect("get counter")
        .value
        .and_then(|v| v.as_u64())
        .map(|u| u.value())
        .expect("counter present")
}

/// All keys under `prefix`, in order
pub fn keys_under(db: &Database, prefix: Key) -> Vec<Key> {
    db.list(&ListSelector::prefix(prefix), ListOptions::default())
        .expect("list")
        .map(|e| e.expect("entry").key)
        .collect()
}
