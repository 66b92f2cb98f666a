//! Test trees ordered by the reverse comparator.

use crate::btree::TreeOptions;
use crate::datum::Comparator;
use crate::e2e_tests::helpers::keys;
use crate::encoding::Encoding;
use crate::testing::memory_tree;

#[test]
fn test_reverse_browse_is_descending() {
    let tree = memory_tree::<i32, i32>(
        Encoding::Compact,
        TreeOptions::default()
            .with_comparator(Comparator::Reverse)
            .with_page_capacity(4),
    );
    for key in [5, -3, 12, 0, 7, 7, 100, -50] {
        tree.insert(key, key * 2, false).expect("insert");
    }

    assert_eq!(keys(&tree), vec![100, 12, 7, 5, 0, -3, -50]);
    assert_eq!(tree.find(&-3).expect("find"), Some(-6));

    // "Greater or equal" follows the comparator, so it walks downwards.
    assert_eq!(tree.find_greater_or_equal(&6).expect("ge 6"), Some((5, 10)));
}

#[test]
fn test_reverse_tree_reloads_with_comparator() {
    let tree = memory_tree::<u64, u64>(
        Encoding::Legacy,
        TreeOptions::default().with_comparator(Comparator::Reverse),
    );
    for key in 0..100 {
        tree.insert(key, key, false).expect("insert");
    }

    let reloaded = crate::btree::BTree::<u64, u64, _>::load(
        std::sync::Arc::clone(tree.store()),
        tree.record_id(),
    )
    .expect("load");
    assert_eq!(reloaded.comparator(), Comparator::Reverse);
    assert_eq!(keys(&reloaded), (0..100).rev().collect::<Vec<_>>());
}
