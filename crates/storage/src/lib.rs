//! Storage layer for StrataKV
//!
//! This crate implements the ordered in-memory map behind every database:
//! - OrderedStore: BTreeMap over encoded key bytes behind a RwLock
//! - StoredValue: serialized value with commit version and expiry
//! - WriteOp: one resolved write of a commit
//! - ExpiryIndex: deadline → keys, for reclaiming expired entries
//! - Read/write guards used by the commit path

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ordered;
pub mod stored_value;
pub mod ttl;

pub use ordered::{OrderedStore, StoreReadGuard, StoreWriteGuard, WriteOp};
pub use stored_value::StoredValue;
pub use ttl::ExpiryIndex;
