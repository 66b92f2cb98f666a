//! Test trees whose records were written by older stores.

use std::sync::Arc;

use crate::btree::{BTree, BTreeError, TreeOptions, TreeRecord};
use crate::datum::Comparator;
use crate::encoding::{Encoding, Writer};
use crate::storage::{MemoryStore, RecordStore};
use crate::testing::init_tracing;

/// A legacy tree record for an empty tree, ending right after the entry count.
fn record_without_provider(page_capacity: i32) -> Vec<u8> {
    let mut out = Writer::new();
    out.write_u8(1); // natural comparator
    out.write_u8(0); // no key codec
    out.write_u8(0); // no value codec
    out.write_i32(0); // height
    out.write_i64(0); // root
    out.write_i32(page_capacity);
    out.write_i32(0); // entry count
    out.into_inner()
}

#[test]
fn test_load_record_without_provider() {
    init_tracing();
    let store = Arc::new(MemoryStore::new(Encoding::Legacy));
    let record_id = store
        .insert(&record_without_provider(8))
        .expect("insert old record");

    let tree: BTree<u64, String, _> =
        BTree::load(Arc::clone(&store), record_id).expect("old record loads");
    assert_eq!(tree.compression_provider(), None);
    assert_eq!(tree.comparator(), Comparator::Natural);
    assert_eq!(tree.page_capacity(), 8);
    assert_eq!(tree.height(), 0);

    for key in 0..50 {
        tree.insert(key, key.to_string(), false).expect("insert");
    }

    // The rewritten record carries the provider field again.
    let bytes = store.fetch(record_id).expect("fetch record");
    assert_eq!(bytes.len(), record_without_provider(8).len() + 1);
    let record = TreeRecord::decode(&bytes, Encoding::Legacy).expect("decode");
    assert_eq!(record.entry_count, 50);
    assert_eq!(record.compression, None);
}

#[test]
fn test_entry_count_beyond_32_bits() {
    init_tracing();
    let store = Arc::new(MemoryStore::new(Encoding::Legacy));
    let record = TreeRecord {
        comparator: Comparator::Natural,
        key_codec: None,
        value_codec: None,
        height: 1,
        root: Some(999),
        page_capacity: 16,
        entry_count: 5_000_000_000,
        compression: None,
    };
    let record_id = store
        .insert(&record.encode(Encoding::Legacy).expect("encode"))
        .expect("insert record");

    let tree: BTree<u64, u64, _> = BTree::load(store, record_id).expect("load");
    assert_eq!(tree.entry_count(), 5_000_000_000);
    assert!(matches!(tree.size(), Err(BTreeError::CapacityExceeded(_))));
}

#[test]
fn test_unknown_codec_tag_is_format_error() {
    init_tracing();
    let store = Arc::new(MemoryStore::new(Encoding::Legacy));
    let mut bytes = record_without_provider(16);
    bytes[1] = 0x7F;
    let record_id = store.insert(&bytes).expect("insert record");

    let result = BTree::<u64, u64, _>::load(store, record_id);
    assert!(matches!(result, Err(BTreeError::Format(_))));
}

#[test]
fn test_record_in_other_encoding_is_rejected() {
    init_tracing();
    let store = Arc::new(MemoryStore::new(Encoding::Compact));
    let record_id = store
        .insert(&record_without_provider(16))
        .expect("insert record");

    let result = BTree::<u64, u64, _>::load(store, record_id);
    assert!(matches!(result, Err(BTreeError::Format(_))));
}

#[test]
fn test_damaged_node_record_is_format_error() {
    init_tracing();
    let store = Arc::new(MemoryStore::new(Encoding::Legacy));
    let tree: BTree<u64, String, _> = BTree::create(
        Arc::clone(&store),
        TreeOptions::default().with_page_capacity(4),
    )
    .expect("create tree");
    for key in 0..3 {
        tree.insert(key, key.to_string(), false).expect("insert");
    }
    let record =
        TreeRecord::decode(&store.fetch(tree.record_id()).expect("fetch"), Encoding::Legacy)
            .expect("decode tree record");
    let root = record.root.expect("root leaf");

    let mut bytes = store.fetch(root).expect("fetch root");
    bytes.truncate(bytes.len() - 3);
    store.corrupt(root, bytes).expect("truncate root");
    assert!(matches!(tree.find(&1), Err(BTreeError::Format(_))));

    // A leaf that claims more entries than the page capacity allows.
    let mut oversized = Writer::new();
    oversized.write_i32(5);
    oversized.write_i64(0);
    oversized.write_i64(0);
    store.corrupt(root, oversized.into_inner()).expect("overwrite root");
    assert!(matches!(tree.browse(), Err(BTreeError::Format(_))));
}
