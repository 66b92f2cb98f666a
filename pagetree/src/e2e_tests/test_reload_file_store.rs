//! Test that a populated tree survives closing and reopening its file store.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::btree::{BTree, BTreeError, TreeOptions};
use crate::encoding::Encoding;
use crate::storage::{FileStore, RecordStore};
use crate::testing::temp_file_store;

/// 1000 distinct keys in a scattered insertion order.
fn generated_keys() -> Vec<u64> {
    (0..1000u64).map(|i| (i * 7919) % 10007).collect()
}

fn value_for(key: u64) -> String {
    format!("value-{key:05}")
}

fn close(store: Arc<FileStore>) {
    let Ok(store) = Arc::try_unwrap(store) else {
        panic!("tree handles should be dropped before closing the store");
    };
    store.close().expect("close store");
}

fn reload_scenario(encoding: Encoding) {
    let (dir, store) = temp_file_store(encoding);
    let path = store.path().to_path_buf();
    let store = Arc::new(store);

    let tree: BTree<u64, String, _> = BTree::create(
        Arc::clone(&store),
        TreeOptions::default().with_page_capacity(16),
    )
    .expect("create tree");
    for key in generated_keys() {
        assert_eq!(tree.insert(key, value_for(key), false).expect("insert"), None);
    }
    assert_eq!(tree.entry_count(), 1000);
    store
        .set_root_record(Some(tree.record_id()))
        .expect("remember tree record");
    drop(tree);
    close(store);

    let store = Arc::new(FileStore::open(&path).expect("reopen store"));
    assert_eq!(store.encoding(), encoding);
    let record_id = store.root_record().expect("tree record id survives reopen");
    let tree: BTree<u64, String, _> =
        BTree::load(Arc::clone(&store), record_id).expect("load tree");
    assert_eq!(tree.entry_count(), 1000);
    assert_eq!(tree.page_capacity(), 16);

    let mut lookups = generated_keys();
    lookups.shuffle(&mut StdRng::seed_from_u64(0x5EED));
    for key in lookups {
        assert_eq!(tree.find(&key).expect("find"), Some(value_for(key)));
    }
    assert_eq!(tree.find(&10_008).expect("find missing"), None);

    drop(tree);
    close(store);
    drop(dir);
}

#[test]
fn test_reload_compact_store() {
    reload_scenario(Encoding::Compact);
}

#[test]
fn test_reload_legacy_store() {
    reload_scenario(Encoding::Legacy);
}

#[test]
fn test_deleted_tree_is_not_found_after_reopen() {
    let (_dir, store) = temp_file_store(Encoding::Compact);
    let path = store.path().to_path_buf();
    let store = Arc::new(store);

    let tree: BTree<u64, u64, _> =
        BTree::create(Arc::clone(&store), TreeOptions::default()).expect("create tree");
    for key in 0..200 {
        tree.insert(key, key, false).expect("insert");
    }
    let record_id = tree.record_id();
    tree.delete().expect("delete tree");
    assert_eq!(store.record_count(), 0);
    close(store);

    let store = Arc::new(FileStore::open(&path).expect("reopen store"));
    let result = BTree::<u64, u64, _>::load(store, record_id);
    assert!(matches!(result, Err(BTreeError::NotFound(id)) if id == record_id));
}
