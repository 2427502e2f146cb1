//! StrataKV - embedded, ordered, transactional key-value store
//!
//! Keys are sequences of typed parts with a strict total order, values are
//! arbitrary value graphs, and every commit is stamped with a monotonically
//! increasing versionstamp that atomic batches can check against.
//!
//! # Quick Start
//!
//! ```ignore
//! use stratakv::{Database, Key, KeyPart, KvU64, ListOptions, ListSelector};
//!
//! let db = Database::open(":memory:")?;
//! let key = Key::new(vec![KeyPart::from("users"), KeyPart::from("alice")]);
//!
//! db.set(key.clone(), "admin")?;
//! let entry = db.get(&key)?;
//!
//! // Compare-and-swap plus a counter, in one commit
//! let result = db
//!     .atomic()
//!     .check(key.clone(), entry.versionstamp)
//!     .set(key, "owner")
//!     .sum(Key::new(vec![KeyPart::from("edits")]), KvU64::new(1))
//!     .commit()?;
//!
//! for entry in db.list(&ListSelector::prefix(Key::new(vec![KeyPart::from("users")])), ListOptions::default())? {
//!     println!("{} = {:?}", entry?.key, result);
//! }
//! ```
//!
//! # Architecture
//!
//! | Crate | Role |
//! |-------|------|
//! | `stratakv-core` | keys, values, codecs, versionstamps, limits, errors |
//! | `stratakv-storage` | ordered in-memory store |
//! | `stratakv-durability` | commit log for path-backed stores |
//! | `stratakv-concurrency` | atomic batches, key locks, commit protocol |
//! | `stratakv-engine` | the `Database` handle, list scans, cursors |

pub use stratakv_concurrency::{AtomicOperation, Check, CommitResult, Mutation, MutationKind};
pub use stratakv_core::{
    Composite, ErrorCategory, Key, KeyPart, KvEntry, KvEntryMaybe, KvError, KvResult, KvU64,
    LimitError, Limits, Node, ObjectId, OpaqueKind, Value, Versionstamp,
};
pub use stratakv_durability::DurabilityMode;
pub use stratakv_engine::{
    CommitMetrics, Database, DatabaseConfig, ListIterator, ListOptions, ListSelector, Location,
};
