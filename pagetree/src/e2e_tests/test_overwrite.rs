//! Test that insert honors the replace flag.

use crate::btree::TreeOptions;
use crate::encoding::Encoding;
use crate::testing::memory_tree;

#[test]
fn test_replace_and_keep() {
    let tree = memory_tree::<String, String>(Encoding::Compact, TreeOptions::default());
    let key = "k".to_string();

    assert_eq!(tree.insert(key.clone(), "v1".into(), false).expect("insert v1"), None);
    assert_eq!(
        tree.insert(key.clone(), "v2".into(), true).expect("replace with v2"),
        Some("v1".to_string())
    );
    assert_eq!(tree.find(&key).expect("find"), Some("v2".to_string()));

    assert_eq!(
        tree.insert(key.clone(), "v3".into(), false).expect("keep v2"),
        Some("v2".to_string())
    );
    assert_eq!(tree.find(&key).expect("find"), Some("v2".to_string()));
    assert_eq!(tree.entry_count(), 1);
}

#[test]
fn test_replace_deep_in_tree() {
    let tree = memory_tree::<u32, u32>(
        Encoding::Legacy,
        TreeOptions::default().with_page_capacity(2),
    );
    for key in 0..64 {
        tree.insert(key, key, false).expect("insert");
    }
    let height = tree.height();

    for key in 0..64 {
        assert_eq!(tree.insert(key, key + 1000, true).expect("replace"), Some(key));
    }
    for key in 0..64 {
        assert_eq!(tree.find(&key).expect("find"), Some(key + 1000));
    }
    assert_eq!(tree.entry_count(), 64);
    assert_eq!(tree.height(), height, "replacing never restructures");
}
