//! Test trees whose node keys go through leading-value compression.

use std::sync::Arc;

use crate::btree::{BTree, TreeOptions, TreeRecord};
use crate::compression::CompressionProvider;
use crate::datum::Codec;
use crate::e2e_tests::helpers::keys;
use crate::encoding::Encoding;
use crate::storage::{MemoryStore, RecordStore};
use crate::testing::memory_tree;

fn url_keys() -> Vec<String> {
    (0..40)
        .map(|i| format!("https://example.org/catalog/items/{i:04}"))
        .collect()
}

/// Size of the root record of a single-leaf tree.
fn root_size<V: crate::datum::Datum>(tree: &BTree<String, V, MemoryStore>) -> usize {
    let store = tree.store();
    let bytes = store.fetch(tree.record_id()).expect("fetch tree record");
    let record = TreeRecord::decode(&bytes, store.encoding()).expect("decode tree record");
    let root = record.root.expect("populated tree has a root");
    store.fetch(root).expect("fetch root").len()
}

#[test]
fn test_text_compression_shrinks_leaves() {
    let options = TreeOptions::default()
        .with_page_capacity(64)
        .with_key_codec(Codec::LengthTagged);
    let plain = memory_tree::<String, u32>(Encoding::Compact, options);
    let compressed = memory_tree::<String, u32>(
        Encoding::Compact,
        options.with_compression(CompressionProvider::TEXT),
    );

    for (i, key) in url_keys().into_iter().enumerate() {
        let value = u32::try_from(i).expect("small index");
        plain.insert(key.clone(), value, false).expect("insert plain");
        compressed.insert(key, value, false).expect("insert compressed");
    }

    assert_eq!(plain.height(), 1);
    assert_eq!(compressed.height(), 1);
    assert!(root_size(&compressed) < root_size(&plain) / 2);
    assert_eq!(keys(&compressed), keys(&plain));
}

#[test]
fn test_binary_compression_across_splits() {
    let tree = memory_tree::<Vec<u8>, Vec<u8>>(
        Encoding::Legacy,
        TreeOptions::default()
            .with_page_capacity(4)
            .with_compression(CompressionProvider::BINARY),
    );

    let mut expected = Vec::new();
    for i in 0u16..300 {
        let mut key = b"shared-prefix/".to_vec();
        key.extend_from_slice(&i.to_be_bytes());
        tree.insert(key.clone(), i.to_le_bytes().to_vec(), false)
            .expect("insert");
        expected.push(key);
    }
    for (i, key) in expected.iter().enumerate().filter(|(i, _)| i % 4 == 0) {
        let removed = tree.remove(key).expect("remove");
        let i = u16::try_from(i).expect("small index");
        assert_eq!(removed, Some(i.to_le_bytes().to_vec()));
    }
    expected = expected
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % 4 != 0)
        .map(|(_, key)| key)
        .collect();

    let reloaded =
        BTree::<Vec<u8>, Vec<u8>, _>::load(Arc::clone(tree.store()), tree.record_id())
            .expect("load");
    assert_eq!(reloaded.compression_provider(), Some(CompressionProvider::BINARY));
    assert_eq!(keys(&reloaded), expected);
}

#[test]
fn test_packed_codec_tree() {
    let tree = memory_tree::<u64, i64>(
        Encoding::Compact,
        TreeOptions::default()
            .with_key_codec(Codec::Packed)
            .with_value_codec(Codec::Packed)
            .with_compression(CompressionProvider::BINARY),
    );
    for key in (0..500u64).rev() {
        let value = -i64::try_from(key).expect("small key");
        tree.insert(key, value, false).expect("insert");
    }
    for key in [0u64, 1, 127, 128, 499] {
        let value = -i64::try_from(key).expect("small key");
        assert_eq!(tree.find(&key).expect("find"), Some(value));
    }
    assert_eq!(keys(&tree), (0..500).collect::<Vec<_>>());
}
