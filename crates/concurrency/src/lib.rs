//! Concurrency layer for StrataKV
//!
//! This crate implements atomic batch commits with:
//! - AtomicOperation: builder for checks and mutations
//! - KeyLockTable: striped per-key locks, acquired in a global order
//! - Check validation against the latest committed versionstamps
//! - Mutation resolution (set, delete, sum, min, max)
//! - CommitManager: version allocation, commit log append and apply
//!
//! Commits touching disjoint keys proceed in parallel; commits that share a
//! key serialize on its stripe, so checks and read-modify-write mutations
//! always see the latest committed value.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod locks;
pub mod manager;
pub mod mutation;
pub mod validation;

pub use atomic::{
    AtomicBatch, AtomicOperation, Check, CommitResult, CommitTarget, Mutation, MutationKind,
};
pub use locks::{KeyLockGuard, KeyLockTable, DEFAULT_LOCK_STRIPES};
pub use manager::{CommitManager, VersionAllocator};
pub use mutation::{prepare_mutations, resolve_mutations, NumericOp, PreparedKind, PreparedMutation};
pub use validation::{prepare_checks, validate_checks, ConflictType, PreparedCheck, ValidationResult};
