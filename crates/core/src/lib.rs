//! Core types for StrataKV
//!
//! This crate defines the foundational types used throughout the system:
//! - Key: composite typed keys and their order-preserving encoding
//! - Value: arena-backed value graphs and their binary codec
//! - Versionstamp: externally visible commit identifiers
//! - Limits: size limits checked before any storage access
//! - Error: error type hierarchy
//! - Entry: read projections (`KvEntry`, `KvEntryMaybe`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod error;
pub mod key;
pub mod limits;
pub mod value;
pub mod versionstamp;

pub use entry::{now_millis, KvEntry, KvEntryMaybe};
pub use error::{ErrorCategory, KvError, KvResult};
pub use key::{decode_key, encode_key, encode_prefix, Key, KeyPart};
pub use limits::{LimitError, Limits};
pub use value::{
    deserialize_value, serialize_value, Composite, KvU64, Node, ObjectId, OpaqueKind, Value,
};
pub use versionstamp::Versionstamp;
