//! End-to-end tests through the `stratakv` facade
//!
//! - ACID properties of atomic batches, in memory and on disk
//! - Model-based listing: a random write history matches a BTreeMap model
//! - Bank-transfer invariant under concurrent check-and-set retries

#[path = "../common/mod.rs"]
mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use proptest::prelude::*;
use stratakv::{CommitResult, KvError};

// ============================================================================
// Atomicity and durability
// ============================================================================

#[test]
fn test_committed_batch_survives_reopen_whole() {
    let (db, _dir, location) = disk_db();
    db.atomic()
        .set(key(&["order", "1"]), "placed")
        .sum(key(&["stats", "orders"]), KvU64::new(1))
        .commit()
        .unwrap();
    let failed = db
        .atomic()
        .set(key(&["order", "2"]), "placed")
        .sum(key(&["order", "1"]), KvU64::new(1))
        .commit();
    assert!(matches!(failed, Err(KvError::Type(_))));

    let db = reopen(db, &location);
    assert_eq!(keys_under(&db, key(&["order"])), vec![key(&["order", "1"])]);
    assert_eq!(read_counter(&db, &key(&["stats", "orders"])), 1);
}

#[test]
fn test_closed_database_rejects_everything() {
    let db = memory_db();
    db.close().unwrap();
    assert!(matches!(db.get(&key(&["a"])), Err(KvError::Closed)));
    assert!(matches!(db.set(key(&["a"]), 1.0), Err(KvError::Closed)));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_transfers_preserve_total_balance() {
    let db = Arc::new(memory_db());
    let accounts = ["a", "b", "c", "d"];
    let mut setup = db.atomic();
    for name in accounts {
        setup = setup.set(key(&["acct", name]), KvU64::new(100));
    }
    setup.commit().unwrap();

    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..50 {
                    let from = key(&["acct", accounts[(t + i) % 4]]);
                    let to = key(&["acct", accounts[(t + i + 1) % 4]]);
                    loop {
                        let src = db.get(&from).unwrap();
                        let dst = db.get(&to).unwrap();
                        let src_balance = src.value.as_ref().and_then(|v| v.as_u64()).unwrap().value();
                        let dst_balance = dst.value.as_ref().and_then(|v| v.as_u64()).unwrap().value();
                        if src_balance == 0 {
                            break;
                        }
                        let result = db
                            .atomic()
                            .check(from.clone(), src.versionstamp)
                            .check(to.clone(), dst.versionstamp)
                            .set(from.clone(), KvU64::new(src_balance - 1))
                            .set(to.clone(), KvU64::new(dst_balance + 1))
                            .commit()
                            .unwrap();
                        if result != CommitResult::Conflict {
                            break;
                        }
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let total: u64 = accounts
        .iter()
        .map(|name| read_counter(&db, &key(&["acct", name])))
        .sum();
    assert_eq!(total, 400);
}

// ============================================================================
// Model-based listing
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Set(i64, String),
    Delete(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-20i64..20, "[a-z]{0,4}").prop_map(|(k, v)| Op::Set(k, v)),
        (-20i64..20).prop_map(Op::Delete),
    ]
}

fn int_key(k: i64) -> Key {
    Key::new(vec![KeyPart::from("m"), KeyPart::from(k)])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_list_matches_model(ops in prop::collection::vec(op_strategy(), 1..40), batch in 1usize..5) {
        let db = Database::open(":memory:").unwrap();
        let mut model: BTreeMap<i64, String> = BTreeMap::new();
        for op in &ops {
            match op {
                Op::Set(k, v) => {
                    db.set(int_key(*k), v.clone()).unwrap();
                    model.insert(*k, v.clone());
                }
                Op::Delete(k) => {
                    db.delete(int_key(*k)).unwrap();
                    model.remove(k);
                }
            }
        }

        let listed: Vec<(Key, Value)> = db
            .list(&ListSelector::prefix(key(&["m"])), ListOptions::default().batch_size(batch))
            .unwrap()
            .map(|e| e.map(|e| (e.key, e.value)).unwrap())
            .collect();
        let expected: Vec<(Key, Value)> = model
            .iter()
            .map(|(k, v)| (int_key(*k), Value::from(v.clone())))
            .collect();
        prop_assert_eq!(listed, expected);
        prop_assert_eq!(db.current_version(), ops.len() as u64);
    }
}
