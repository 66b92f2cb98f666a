//! Test that random inserts and removes keep every node within its occupancy
//! bounds and the leaf chain intact, in both directions.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;

use crate::btree::{BTree, TreeOptions};
use crate::compression::CompressionProvider;
use crate::datum::Codec;
use crate::encoding::Encoding;
use crate::testing::memory_tree;

#[derive(Debug, Clone)]
enum ShapeOp {
    Insert(u16),
    Remove(u16),
}

fn op_strategy() -> impl Strategy<Value = ShapeOp> {
    prop_oneof![
        3 => (0u16..160).prop_map(ShapeOp::Insert),
        2 => (0u16..160).prop_map(ShapeOp::Remove),
    ]
}

fn provider_strategy() -> impl Strategy<Value = Option<CompressionProvider>> {
    prop_oneof![
        Just(None),
        Just(Some(CompressionProvider::BINARY)),
        Just(Some(CompressionProvider::TEXT)),
    ]
}

fn key(n: u16) -> String {
    format!("catalog/item/{n:05}")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]
    #[test]
    fn tree_stays_balanced_under_random_ops(
        ops in prop::collection::vec(op_strategy(), 1..400),
        capacity in prop::sample::select(vec![2u32, 4, 6, 16]),
        provider in provider_strategy(),
        encoding in prop_oneof![Just(Encoding::Legacy), Just(Encoding::Compact)],
    ) {
        let mut options = TreeOptions::default()
            .with_page_capacity(capacity)
            .with_key_codec(Codec::LengthTagged);
        if let Some(provider) = provider {
            options = options.with_compression(provider);
        }
        let tree = memory_tree::<String, u32>(encoding, options);
        let mut reference = BTreeMap::new();

        for op in ops {
            match op {
                ShapeOp::Insert(n) => {
                    tree.insert(key(n), u32::from(n), true).expect("insert");
                    reference.insert(key(n), u32::from(n));
                }
                ShapeOp::Remove(n) => {
                    let removed = tree.remove(&key(n)).expect("remove");
                    prop_assert_eq!(removed, reference.remove(&key(n)));
                }
            }
            tree.assert_well_formed();
        }

        let mut cursor = tree.browse_after_last().expect("browse after last");
        let mut backward = Vec::new();
        while let Some(entry) = cursor.previous_entry().expect("previous entry") {
            backward.push(entry);
        }
        let expected: Vec<(String, u32)> =
            reference.iter().rev().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(backward, expected);

        for n in 0u16..160 {
            let found = tree.find_greater_or_equal(&key(n)).expect("find greater or equal");
            let wanted = reference
                .range(key(n)..)
                .next()
                .map(|(k, v)| (k.clone(), *v));
            prop_assert_eq!(found, wanted);
        }

        let reloaded = BTree::<String, u32, _>::load(Arc::clone(tree.store()), tree.record_id())
            .expect("reload tree");
        reloaded.assert_well_formed();
        prop_assert_eq!(reloaded.entry_count(), tree.entry_count());
    }
}
