//! Atomic operation builder
//!
//! An [`AtomicOperation`] accumulates checks and mutations in call order and
//! submits them as one [`AtomicBatch`] to a [`CommitTarget`]. Either every
//! mutation is applied under one versionstamp, or none is.
//!
//! ```ignore
//! let result = db
//!     .atomic()
//!     .check(key.clone(), entry.versionstamp)
//!     .set(key, Value::from("new"))
//!     .sum(counter, KvU64::new(1))
//!     .commit()?;
//! ```

use std::time::Duration;

use stratakv_core::{Key, KvError, KvResult, KvU64, Value, Versionstamp};

/// A versionstamp precondition on one key
///
/// `versionstamp: None` requires the key to be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    /// Key to check
    pub key: Key,
    /// Expected versionstamp of the key's current entry
    pub versionstamp: Option<Versionstamp>,
}

/// What a mutation does to its key
#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    /// Store a value
    Set(Value),
    /// Remove the key
    Delete,
    /// Add to a `KvU64` counter, wrapping at 2^64
    Sum(KvU64),
    /// Keep the smaller of the stored counter and the operand
    Min(KvU64),
    /// Keep the larger of the stored counter and the operand
    Max(KvU64),
}

impl MutationKind {
    /// Operator name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            MutationKind::Set(_) => "set",
            MutationKind::Delete => "delete",
            MutationKind::Sum(_) => "sum",
            MutationKind::Min(_) => "min",
            MutationKind::Max(_) => "max",
        }
    }
}

/// One mutation of an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Target key
    pub key: Key,
    /// Operation
    pub kind: MutationKind,
    /// Relative expiry for `Set`; ignored by other kinds
    pub expire_in: Option<Duration>,
}

impl Mutation {
    /// A mutation without expiry
    pub fn new(key: Key, kind: MutationKind) -> Self {
        Mutation {
            key,
            kind,
            expire_in: None,
        }
    }

    /// Build a mutation from an operator name and a dynamically typed operand
    ///
    /// `sum`, `min` and `max` require a [`KvU64`] operand; `set` requires a
    /// value; `delete` takes none.
    pub fn from_parts(key: Key, op: &str, operand: Option<Value>) -> KvResult<Self> {
        let numeric = |operand: Option<Value>| {
            operand.as_ref().and_then(Value::as_u64).ok_or_else(|| {
                KvError::type_error(format!(
                    "Failed to perform '{}' mutation on a non-U64 operand",
                    op
                ))
            })
        };
        let kind = match op {
            "set" => MutationKind::Set(
                operand.ok_or_else(|| KvError::type_error("Missing value for 'set' mutation"))?,
            ),
            "delete" => MutationKind::Delete,
            "sum" => MutationKind::Sum(numeric(operand)?),
            "min" => MutationKind::Min(numeric(operand)?),
            "max" => MutationKind::Max(numeric(operand)?),
            other => {
                return Err(KvError::type_error(format!(
                    "Invalid mutation type: {}",
                    other
                )))
            }
        };
        Ok(Mutation::new(key, kind))
    }
}

/// The checks and mutations of one atomic operation, in call order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicBatch {
    /// Preconditions
    pub checks: Vec<Check>,
    /// Mutations, applied in order
    pub mutations: Vec<Mutation>,
}

/// Outcome of a commit that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    /// Every mutation was applied under this versionstamp
    Committed {
        /// Versionstamp shared by every key written in the batch
        versionstamp: Versionstamp,
    },
    /// A check failed; nothing was applied
    Conflict,
}

impl CommitResult {
    /// True if the batch was applied
    pub fn is_ok(&self) -> bool {
        matches!(self, CommitResult::Committed { .. })
    }

    /// Versionstamp of an applied batch
    pub fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            CommitResult::Committed { versionstamp } => Some(*versionstamp),
            CommitResult::Conflict => None,
        }
    }
}

/// Anything that can commit an atomic batch
pub trait CommitTarget {
    /// Validate and apply a batch
    ///
    /// Returns `Err` for malformed batches and storage failures;
    /// a failed check is `Ok(CommitResult::Conflict)`.
    fn commit_batch(&self, batch: AtomicBatch) -> KvResult<CommitResult>;
}

/// Builder for an atomic batch bound to a commit target
#[must_use = "an atomic operation does nothing until committed"]
pub struct AtomicOperation<'a> {
    target: &'a dyn CommitTarget,
    batch: AtomicBatch,
}

impl<'a> AtomicOperation<'a> {
    /// Start an empty batch
    pub fn new(target: &'a dyn CommitTarget) -> Self {
        AtomicOperation {
            target,
            batch: AtomicBatch::default(),
        }
    }

    /// Require `key` to be at `versionstamp` (`None`: absent) at commit time
    pub fn check(mut self, key: Key, versionstamp: Option<Versionstamp>) -> Self {
        self.batch.checks.push(Check { key, versionstamp });
        self
    }

    /// Like [`check`](Self::check) with a versionstamp in its string form
    pub fn check_str(self, key: Key, versionstamp: Option<&str>) -> KvResult<Self> {
        let parsed = versionstamp.map(str::parse::<Versionstamp>).transpose()?;
        Ok(self.check(key, parsed))
    }

    /// Add an arbitrary mutation
    pub fn mutate(mut self, mutation: Mutation) -> Self {
        self.batch.mutations.push(mutation);
        self
    }

    /// Store `value` at `key`
    pub fn set(self, key: Key, value: impl Into<Value>) -> Self {
        self.mutate(Mutation::new(key, MutationKind::Set(value.into())))
    }

    /// Store `value` at `key`, reading as absent once `expire_in` has passed
    pub fn set_with_expiry(self, key: Key, value: impl Into<Value>, expire_in: Duration) -> Self {
        self.mutate(Mutation {
            key,
            kind: MutationKind::Set(value.into()),
            expire_in: Some(expire_in),
        })
    }

    /// Remove `key`
    pub fn delete(self, key: Key) -> Self {
        self.mutate(Mutation::new(key, MutationKind::Delete))
    }

    /// Add `operand` to the counter at `key`
    pub fn sum(self, key: Key, operand: KvU64) -> Self {
        self.mutate(Mutation::new(key, MutationKind::Sum(operand)))
    }

    /// Lower the counter at `key` to `operand` if it is larger
    pub fn min(self, key: Key, operand: KvU64) -> Self {
        self.mutate(Mutation::new(key, MutationKind::Min(operand)))
    }

    /// Raise the counter at `key` to `operand` if it is smaller
    pub fn max(self, key: Key, operand: KvU64) -> Self {
        self.mutate(Mutation::new(key, MutationKind::Max(operand)))
    }

    /// The batch built so far
    pub fn batch(&self) -> &AtomicBatch {
        &self.batch
    }

    /// Submit the batch
    pub fn commit(self) -> KvResult<CommitResult> {
        self.target.commit_batch(self.batch)
    }
}
