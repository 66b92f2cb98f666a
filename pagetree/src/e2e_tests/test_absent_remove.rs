//! Test that removing and finding missing keys changes nothing.

use crate::btree::TreeOptions;
use crate::encoding::Encoding;
use crate::testing::memory_tree;

#[test]
fn test_remove_from_empty_tree() {
    let tree = memory_tree::<u64, u64>(Encoding::Compact, TreeOptions::default());
    assert_eq!(tree.remove(&1).expect("remove"), None);
    assert_eq!(tree.entry_count(), 0);
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.find(&1).expect("find"), None);
}

#[test]
fn test_remove_missing_key_keeps_count() {
    let tree = memory_tree::<u64, u64>(
        Encoding::Compact,
        TreeOptions::default().with_page_capacity(4),
    );
    for key in (0..40).map(|k| k * 2) {
        tree.insert(key, key, false).expect("insert");
    }
    tree.store().reset_stats();

    for key in (0..40).map(|k| k * 2 + 1) {
        assert_eq!(tree.remove(&key).expect("remove"), None);
    }
    assert_eq!(tree.entry_count(), 40);

    let stats = tree.store().stats();
    assert_eq!(stats.updates, 0, "absent removes write nothing");
    assert_eq!(stats.deletes, 0);
}

#[test]
fn test_remove_twice() {
    let tree = memory_tree::<u64, String>(Encoding::Legacy, TreeOptions::default());
    tree.insert(5, "five".into(), false).expect("insert");

    assert_eq!(tree.remove(&5).expect("first remove"), Some("five".to_string()));
    assert_eq!(tree.remove(&5).expect("second remove"), None);
    assert_eq!(tree.entry_count(), 0);
    assert_eq!(tree.height(), 0);
}
