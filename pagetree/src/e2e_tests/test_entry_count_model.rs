//! Test random operation sequences against `std::collections::BTreeMap`.

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::btree::TreeOptions;
use crate::e2e_tests::helpers::collect_forward;
use crate::encoding::Encoding;
use crate::testing::memory_tree;

#[derive(Debug, Clone)]
enum ModelOp {
    Insert(u64, u64, bool),
    Remove(u64),
}

fn op_strategy() -> impl Strategy<Value = ModelOp> {
    let key_range = 0u64..96;
    let value_range = 0u64..1024;
    prop_oneof![
        3 => (key_range.clone(), value_range, any::<bool>())
            .prop_map(|(k, v, replace)| ModelOp::Insert(k, v, replace)),
        2 => key_range.prop_map(ModelOp::Remove),
    ]
}

fn encoding_strategy() -> impl Strategy<Value = Encoding> {
    prop_oneof![Just(Encoding::Legacy), Just(Encoding::Compact)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn tree_matches_btreemap_random_ops(
        ops in prop::collection::vec(op_strategy(), 1..300),
        capacity in prop::sample::select(vec![2u32, 4, 6, 16]),
        encoding in encoding_strategy(),
    ) {
        let tree = memory_tree::<u64, u64>(
            encoding,
            TreeOptions::default().with_page_capacity(capacity),
        );
        let mut reference = BTreeMap::new();

        for op in ops {
            match op {
                ModelOp::Insert(key, value, replace) => {
                    let previous = tree.insert(key, value, replace).expect("insert");
                    let expected = reference.get(&key).copied();
                    if replace || expected.is_none() {
                        reference.insert(key, value);
                    }
                    prop_assert_eq!(previous, expected);
                }
                ModelOp::Remove(key) => {
                    let removed = tree.remove(&key).expect("remove");
                    prop_assert_eq!(removed, reference.remove(&key));
                }
            }
            let count = u64::try_from(reference.len()).expect("small map");
            prop_assert_eq!(tree.entry_count(), count);
            prop_assert_eq!(tree.height() == 0, reference.is_empty());
            tree.assert_well_formed();
        }

        let entries = collect_forward(tree.browse().expect("browse"));
        let expected: Vec<(u64, u64)> = reference.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(entries, expected);

        let mut cursor = tree.browse_after_last().expect("browse after last");
        let mut backward = Vec::new();
        while let Some(entry) = cursor.previous_entry().expect("previous entry") {
            backward.push(entry);
        }
        let reversed: Vec<(u64, u64)> = reference.iter().rev().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(backward, reversed);

        for key in 0..96 {
            prop_assert_eq!(tree.find(&key).expect("find"), reference.get(&key).copied());
        }

        tree.delete().expect("delete");
    }
}
