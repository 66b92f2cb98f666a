//! Test that store failures surface unchanged through tree operations.

use std::sync::Arc;

use crate::btree::{BTree, BTreeError, TreeOptions};
use crate::encoding::Encoding;
use crate::storage::{FaultConfig, MemoryStore, StorageError};
use crate::testing::init_tracing;

fn faulty_tree(seed: u64) -> BTree<u64, u64, MemoryStore> {
    init_tracing();
    let store = Arc::new(MemoryStore::with_config(
        Encoding::Compact,
        seed,
        FaultConfig::no_faults(),
    ));
    BTree::create(store, TreeOptions::default().with_page_capacity(4)).expect("create tree")
}

fn is_injected(err: &BTreeError) -> bool {
    matches!(err, BTreeError::Storage(StorageError::InjectedFault(_)))
}

#[test]
fn test_read_faults_fail_lookups() {
    let tree = faulty_tree(1);
    for key in 0..32 {
        tree.insert(key, key, false).expect("insert");
    }

    tree.store().set_fault_config(FaultConfig {
        read_error_rate: 1.0,
        write_error_rate: 0.0,
    });
    assert!(tree.find(&3).is_err_and(|e| is_injected(&e)));
    assert!(tree.browse().is_err_and(|e| is_injected(&e)));
    assert!(tree.remove(&3).is_err_and(|e| is_injected(&e)));
    assert_eq!(tree.entry_count(), 32, "failed remove leaves the count alone");

    tree.store().set_fault_config(FaultConfig::no_faults());
    assert_eq!(tree.find(&3).expect("find after recovery"), Some(3));
}

#[test]
fn test_write_faults_abort_at_first_error() {
    let tree = faulty_tree(42);
    tree.store().set_fault_config(FaultConfig {
        read_error_rate: 0.0,
        write_error_rate: 0.2,
    });

    let mut failures = 0;
    for key in 0..200 {
        if let Err(err) = tree.insert(key, key, false) {
            assert!(is_injected(&err), "unexpected error: {err}");
            failures += 1;
        }
    }

    let stats = tree.store().stats();
    assert!(failures > 0, "a 20% write fault rate should fail some inserts");
    assert_eq!(stats.injected_write_errors, failures);
    assert_eq!(stats.injected_read_errors, 0);
}

#[test]
fn test_same_seed_same_failures() {
    let run = |seed| {
        let tree = faulty_tree(seed);
        tree.store().set_fault_config(FaultConfig {
            read_error_rate: 0.1,
            write_error_rate: 0.1,
        });
        (0..100)
            .map(|key| tree.insert(key, key, false).is_ok())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(7), run(7));
}
