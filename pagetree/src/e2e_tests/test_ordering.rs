//! Test that cursors yield entries in key order.

use crate::btree::TreeOptions;
use crate::e2e_tests::helpers::{collect_forward, keys};
use crate::encoding::Encoding;
use crate::testing::memory_tree;

#[test]
fn test_browse_yields_sorted_distinct_keys() {
    let tree = memory_tree::<u64, String>(Encoding::Compact, TreeOptions::default());

    for key in [3, 1, 4, 1, 5, 9, 2, 6] {
        tree.insert(key, format!("v{key}"), false).expect("insert");
    }

    assert_eq!(keys(&tree), vec![1, 2, 3, 4, 5, 6, 9]);
    assert_eq!(tree.entry_count(), 7);
}

#[test]
fn test_browse_from_starts_at_key() {
    let tree = memory_tree::<u64, String>(
        Encoding::Compact,
        TreeOptions::default().with_page_capacity(2),
    );
    for key in [3, 1, 4, 1, 5, 9, 2, 6] {
        tree.insert(key, format!("v{key}"), false).expect("insert");
    }

    let entries = collect_forward(tree.browse_from(&4).expect("browse from 4"));
    assert_eq!(
        entries.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
        vec![4, 5, 6, 9]
    );
    assert_eq!(entries[0].1, "v4");

    // A key between entries starts at the next larger one.
    let mut cursor = tree.browse_from(&7).expect("browse from 7");
    assert_eq!(
        cursor.next_entry().expect("next"),
        Some((9, "v9".to_string()))
    );
}

#[test]
fn test_find_greater_or_equal() {
    let tree = memory_tree::<u64, u64>(
        Encoding::Legacy,
        TreeOptions::default().with_page_capacity(4),
    );
    for key in (0..100).step_by(10) {
        tree.insert(key, key + 1, false).expect("insert");
    }

    assert_eq!(tree.find_greater_or_equal(&0).expect("ge 0"), Some((0, 1)));
    assert_eq!(tree.find_greater_or_equal(&31).expect("ge 31"), Some((40, 41)));
    assert_eq!(tree.find_greater_or_equal(&90).expect("ge 90"), Some((90, 91)));
    assert_eq!(tree.find_greater_or_equal(&91).expect("ge 91"), None);
}

#[test]
fn test_ordering_survives_removals() {
    let tree = memory_tree::<i64, i64>(
        Encoding::Compact,
        TreeOptions::default().with_page_capacity(4),
    );
    for key in -200..200 {
        tree.insert(key, key, false).expect("insert");
    }
    for key in (-200..200).filter(|k| k % 3 != 0) {
        tree.remove(&key).expect("remove");
    }

    let expected: Vec<i64> = (-200..200).filter(|k| k % 3 == 0).collect();
    assert_eq!(keys(&tree), expected);

    let mut cursor = tree.browse_after_last().expect("browse after last");
    let mut backwards = Vec::new();
    while let Some((key, _)) = cursor.previous_entry().expect("previous") {
        backwards.push(key);
    }
    backwards.reverse();
    assert_eq!(backwards, expected);
}
