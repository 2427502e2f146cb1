//! Mutation preparation and resolution
//!
//! Preparation happens before any lock is taken: keys are encoded, values
//! serialized and every size limit checked, so a malformed batch fails
//! without touching the store. Resolution happens under the batch's key
//! stripes: each mutation is turned into a concrete [`WriteOp`], in order,
//! over a staging overlay so that a later mutation on the same key sees the
//! result of an earlier one.

use std::collections::HashMap;

use stratakv_core::{
    deserialize_value, encode_key, serialize_value, Key, KvError, KvResult, KvU64, Limits, Value,
};
use stratakv_storage::{StoreReadGuard, WriteOp};

use crate::atomic::{Mutation, MutationKind};

/// Counter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    /// Wrapping addition
    Sum,
    /// Unsigned minimum
    Min,
    /// Unsigned maximum
    Max,
}

impl NumericOp {
    /// Operator name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            NumericOp::Sum => "sum",
            NumericOp::Min => "min",
            NumericOp::Max => "max",
        }
    }

    /// Combine the stored counter with the operand; a missing counter takes the operand
    pub fn apply(&self, current: Option<u64>, operand: u64) -> u64 {
        match (self, current) {
            (_, None) => operand,
            (NumericOp::Sum, Some(c)) => c.wrapping_add(operand),
            (NumericOp::Min, Some(c)) => c.min(operand),
            (NumericOp::Max, Some(c)) => c.max(operand),
        }
    }
}

/// A mutation after validation
#[derive(Debug, Clone)]
pub enum PreparedKind {
    /// Store serialized bytes
    Put {
        /// Serialized value
        value: Vec<u8>,
        /// Expiry deadline (ms since epoch)
        expires_at: Option<u64>,
    },
    /// Remove the key
    Delete,
    /// Counter update
    Numeric(NumericOp, u64),
}

/// A mutation with its key encoded and payload validated
#[derive(Debug, Clone)]
pub struct PreparedMutation {
    /// Logical key
    pub key: Key,
    /// Encoded key
    pub encoded: Vec<u8>,
    /// Resolved operation
    pub kind: PreparedKind,
}

/// Encode, serialize and size-check every mutation
///
/// `now` is the wall clock in ms, used to turn relative expiry into a deadline.
pub fn prepare_mutations(
    mutations: &[Mutation],
    limits: &Limits,
    now: u64,
) -> KvResult<Vec<PreparedMutation>> {
    let mut total_bytes = 0usize;
    let mut prepared = Vec::with_capacity(mutations.len());

    for mutation in mutations {
        let encoded = encode_key(&mutation.key)?;
        limits.validate_write_key(&encoded)?;
        total_bytes += encoded.len();

        let kind = match &mutation.kind {
            MutationKind::Set(value) => {
                let bytes = serialize_value(value)?;
                limits.validate_value(&bytes)?;
                total_bytes += bytes.len();
                let expires_at = mutation
                    .expire_in
                    .map(|d| now.saturating_add(d.as_millis().min(u64::MAX as u128) as u64));
                PreparedKind::Put {
                    value: bytes,
                    expires_at,
                }
            }
            MutationKind::Delete => PreparedKind::Delete,
            MutationKind::Sum(operand) => PreparedKind::Numeric(NumericOp::Sum, operand.value()),
            MutationKind::Min(operand) => PreparedKind::Numeric(NumericOp::Min, operand.value()),
            MutationKind::Max(operand) => PreparedKind::Numeric(NumericOp::Max, operand.value()),
        };
        if let PreparedKind::Numeric(..) = kind {
            total_bytes += std::mem::size_of::<u64>();
        }

        prepared.push(PreparedMutation {
            key: mutation.key.clone(),
            encoded,
            kind,
        });
    }

    limits.validate_total_mutation_bytes(total_bytes)?;
    Ok(prepared)
}

/// Turn prepared mutations into concrete writes against the current store
///
/// Fails with a type error if a counter operator meets a stored value that
/// is not a [`KvU64`].
pub fn resolve_mutations(
    prepared: Vec<PreparedMutation>,
    store: &StoreReadGuard<'_>,
) -> KvResult<Vec<WriteOp>> {
    // Latest staged bytes per key; None marks a staged delete.
    let mut staged: HashMap<Vec<u8>, Option<Vec<u8>>> = HashMap::new();
    let mut ops = Vec::with_capacity(prepared.len());

    for mutation in prepared {
        let op = match mutation.kind {
            PreparedKind::Put { value, expires_at } => {
                staged.insert(mutation.encoded.clone(), Some(value.clone()));
                WriteOp::Put {
                    key: mutation.encoded,
                    value,
                    expires_at,
                }
            }
            PreparedKind::Delete => {
                staged.insert(mutation.encoded.clone(), None);
                WriteOp::Delete {
                    key: mutation.encoded,
                }
            }
            PreparedKind::Numeric(op, operand) => {
                let current = match staged.get(&mutation.encoded) {
                    Some(Some(bytes)) => Some(read_counter(op, bytes)?),
                    Some(None) => None,
                    None => match store.get(&mutation.encoded) {
                        Some(sv) => Some(read_counter(op, sv.bytes())?),
                        None => None,
                    },
                };
                let result = op.apply(current, operand);
                let value = serialize_value(&Value::from(KvU64::new(result)))?;
                staged.insert(mutation.encoded.clone(), Some(value.clone()));
                WriteOp::Put {
                    key: mutation.encoded,
                    value,
                    expires_at: None,
                }
            }
        };
        ops.push(op);
    }
    Ok(ops)
}

fn read_counter(op: NumericOp, bytes: &[u8]) -> KvResult<u64> {
    deserialize_value(bytes)?
        .as_u64()
        .map(|u| u.value())
        .ok_or_else(|| {
            KvError::type_error(format!(
                "Failed to perform '{}' mutation on a non-U64 value in the database",
                op.name()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stratakv_core::{KeyPart, LimitError, Node, OpaqueKind};
    use stratakv_storage::OrderedStore;

    fn key(name: &str) -> Key {
        Key::new(vec![KeyPart::from(name)])
    }

    fn set(name: &str, value: impl Into<Value>) -> Mutation {
        Mutation::new(key(name), MutationKind::Set(value.into()))
    }

    fn resolve(mutations: &[Mutation], store: &OrderedStore) -> KvResult<Vec<WriteOp>> {
        let prepared = prepare_mutations(mutations, &Limits::default(), 0)?;
        resolve_mutations(prepared, &store.read())
    }

    fn counter_of(op: &WriteOp) -> u64 {
        match op {
            WriteOp::Put { value, .. } => deserialize_value(value).unwrap().as_u64().unwrap().value(),
            other => panic!("expected a put, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_op_semantics() {
        assert_eq!(NumericOp::Sum.apply(Some(u64::MAX), 10), 9);
        assert_eq!(NumericOp::Sum.apply(None, 10), 10);
        assert_eq!(NumericOp::Min.apply(Some(5), 3), 3);
        assert_eq!(NumericOp::Min.apply(None, 3), 3);
        assert_eq!(NumericOp::Max.apply(Some(5), 3), 5);
        assert_eq!(NumericOp::Max.apply(Some(u64::MAX), 1), u64::MAX);
    }

    #[test]
    fn test_sum_on_missing_key_takes_operand() {
        let store = OrderedStore::new();
        let ops = resolve(
            &[Mutation::new(key("c"), MutationKind::Sum(KvU64::new(4)))],
            &store,
        )
        .unwrap();
        assert_eq!(counter_of(&ops[0]), 4);
    }

    #[test]
    fn test_later_mutations_see_earlier_ones() {
        let store = OrderedStore::new();
        let ops = resolve(
            &[
                set("c", KvU64::new(10)),
                Mutation::new(key("c"), MutationKind::Sum(KvU64::new(5))),
                Mutation::new(key("c"), MutationKind::Max(KvU64::new(12))),
                Mutation::new(key("c"), MutationKind::Delete),
                Mutation::new(key("c"), MutationKind::Min(KvU64::new(7))),
            ],
            &store,
        )
        .unwrap();
        assert_eq!(ops.len(), 5);
        assert_eq!(counter_of(&ops[1]), 15);
        assert_eq!(counter_of(&ops[2]), 15);
        assert_eq!(counter_of(&ops[4]), 7);
    }

    #[test]
    fn test_sum_on_non_u64_stored_value_fails() {
        let store = OrderedStore::new();
        let encoded = encode_key(&key("s")).unwrap();
        store.apply(
            &[WriteOp::Put {
                key: encoded,
                value: serialize_value(&Value::from("text")).unwrap(),
                expires_at: None,
            }],
            1,
        );
        for kind in [
            MutationKind::Sum(KvU64::new(1)),
            MutationKind::Min(KvU64::new(1)),
            MutationKind::Max(KvU64::new(1)),
        ] {
            let name = kind.name();
            let err = resolve(&[Mutation::new(key("s"), kind)], &store).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!(
                    "TypeError: Failed to perform '{}' mutation on a non-U64 value in the database",
                    name
                )
            );
        }
    }

    #[test]
    fn test_expiry_becomes_deadline() {
        let mutation = Mutation {
            key: key("e"),
            kind: MutationKind::Set(Value::from(true)),
            expire_in: Some(Duration::from_millis(250)),
        };
        let prepared = prepare_mutations(&[mutation], &Limits::default(), 1_000).unwrap();
        assert!(matches!(
            prepared[0].kind,
            PreparedKind::Put {
                expires_at: Some(1_250),
                ..
            }
        ));
    }

    #[test]
    fn test_prepare_rejects_opaque_values() {
        let value = Value::new(Node::Opaque(OpaqueKind::Function));
        let err = prepare_mutations(&[set("f", value)], &Limits::default(), 0).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_prepare_enforces_write_key_limit() {
        let ok = Key::new(vec![KeyPart::Bytes(vec![1u8; 2046])]);
        let too_big = Key::new(vec![KeyPart::Bytes(vec![1u8; 2047])]);
        let limits = Limits::default();
        assert!(prepare_mutations(
            &[Mutation::new(ok, MutationKind::Delete)],
            &limits,
            0
        )
        .is_ok());
        let err = prepare_mutations(&[Mutation::new(too_big, MutationKind::Delete)], &limits, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            KvError::SizeLimit(LimitError::KeyTooLargeForWrite { .. })
        ));
    }

    #[test]
    fn test_prepare_enforces_value_limit() {
        let value = Value::from(vec![0u8; 65_536]);
        let err = prepare_mutations(&[set("big", value)], &Limits::default(), 0).unwrap_err();
        assert!(matches!(err, KvError::SizeLimit(LimitError::ValueTooLarge { .. })));
    }

    #[test]
    fn test_prepare_enforces_total_size() {
        let limits = Limits {
            max_total_mutation_bytes: 100,
            ..Limits::default()
        };
        let mutations = vec![set("a", vec![0u8; 60]), set("b", vec![0u8; 60])];
        let err = prepare_mutations(&mutations, &limits, 0).unwrap_err();
        assert!(matches!(
            err,
            KvError::SizeLimit(LimitError::TotalMutationTooLarge { .. })
        ));
    }
}
