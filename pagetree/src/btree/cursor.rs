//! Bidirectional cursor over tree entries.
//!
//! A cursor sits *between* entries. [`Cursor::next_entry`] returns the entry
//! after the position and moves past it; [`Cursor::previous_entry`] returns
//! the entry before the position and moves before it. Stepping off either end
//! of a leaf follows the leaf's sibling link, so no step re-descends from the
//! root.

use std::sync::Arc;

use crate::btree::BTreeError;
use crate::btree::node::{LeafNode, NodeFormat};
use crate::datum::Datum;
use crate::storage::{RecordId, RecordStore};

/// Cursor over the entries of a [`BTree`](crate::btree::BTree).
///
/// Holds its own handle to the store and the current leaf. It does not lock
/// the tree: concurrent inserts or removes may leave it looking at a stale
/// leaf.
pub struct Cursor<K, V, S> {
    store: Arc<S>,
    format: NodeFormat,
    page_capacity: usize,
    leaf: Option<(RecordId, LeafNode<K, V>)>,
    /// Position before `leaf.entries[index]`.
    index: usize,
}

impl<K, V, S> Cursor<K, V, S>
where
    K: Datum + Ord,
    V: Datum,
    S: RecordStore,
{
    pub(crate) const fn new(
        store: Arc<S>,
        format: NodeFormat,
        page_capacity: usize,
        leaf_id: RecordId,
        leaf: LeafNode<K, V>,
        index: usize,
    ) -> Self {
        Self {
            store,
            format,
            page_capacity,
            leaf: Some((leaf_id, leaf)),
            index,
        }
    }

    /// A cursor over an empty tree.
    pub(crate) const fn empty(store: Arc<S>, format: NodeFormat, page_capacity: usize) -> Self {
        Self {
            store,
            format,
            page_capacity,
            leaf: None,
            index: 0,
        }
    }

    fn load(&self, id: RecordId) -> Result<LeafNode<K, V>, BTreeError> {
        self.format.load_leaf(&*self.store, id, self.page_capacity)
    }

    /// The entry after the cursor, or `None` at the end.
    pub fn next_entry(&mut self) -> Result<Option<(K, V)>, BTreeError> {
        loop {
            let Some((_, leaf)) = &self.leaf else {
                return Ok(None);
            };

            if let Some(entry) = leaf.entries.get(self.index) {
                let result = (entry.key.clone(), entry.value.clone());
                self.index += 1;
                return Ok(Some(result));
            }

            let Some(next) = leaf.next else {
                return Ok(None);
            };
            let next_leaf = self.load(next)?;
            self.leaf = Some((next, next_leaf));
            self.index = 0;
        }
    }

    /// The entry before the cursor, or `None` at the start.
    pub fn previous_entry(&mut self) -> Result<Option<(K, V)>, BTreeError> {
        loop {
            let Some((_, leaf)) = &self.leaf else {
                return Ok(None);
            };

            if self.index > 0 {
                if let Some(entry) = leaf.entries.get(self.index - 1) {
                    let result = (entry.key.clone(), entry.value.clone());
                    self.index -= 1;
                    return Ok(Some(result));
                }
            }

            let Some(prev) = leaf.prev else {
                return Ok(None);
            };
            let prev_leaf = self.load(prev)?;
            self.index = prev_leaf.entries.len();
            self.leaf = Some((prev, prev_leaf));
        }
    }

    /// Record id of the leaf the cursor is in.
    #[must_use]
    pub fn leaf_id(&self) -> Option<RecordId> {
        self.leaf.as_ref().map(|(id, _)| *id)
    }
}

impl<K, V, S> Iterator for Cursor<K, V, S>
where
    K: Datum + Ord,
    V: Datum,
    S: RecordStore,
{
    type Item = Result<(K, V), BTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.next_entry().transpose();
        if matches!(item, Some(Err(_))) {
            // Stop after the first error.
            self.leaf = None;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::{BTree, TreeOptions};
    use crate::encoding::Encoding;
    use crate::storage::{FaultConfig, MemoryStore};

    fn populated(
        capacity: u32,
        keys: impl IntoIterator<Item = u64>,
    ) -> BTree<u64, u64, MemoryStore> {
        let store = Arc::new(MemoryStore::new(Encoding::Compact));
        let tree = BTree::create(store, TreeOptions::default().with_page_capacity(capacity))
            .expect("create tree");
        for key in keys {
            tree.insert(key, key * 10, false).expect("insert");
        }
        tree
    }

    #[test]
    fn test_forward_across_leaves() {
        let tree = populated(4, (0..50).rev());
        let keys: Vec<u64> = tree
            .browse()
            .expect("cursor")
            .map(|entry| entry.expect("entry").0)
            .collect();
        assert_eq!(keys, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_backward_from_end() {
        let tree = populated(4, 0..50);
        let mut cursor = tree.browse_after_last().expect("cursor");
        let mut keys = Vec::new();
        while let Some((key, value)) = cursor.previous_entry().expect("previous") {
            assert_eq!(value, key * 10);
            keys.push(key);
        }
        assert_eq!(keys, (0..50).rev().collect::<Vec<_>>());
        assert_eq!(cursor.next_entry().expect("next"), Some((0, 0)));
    }

    #[test]
    fn test_change_direction() {
        let tree = populated(2, 0..10);
        let mut cursor = tree.browse_from(&5).expect("cursor");
        assert_eq!(cursor.next_entry().expect("next"), Some((5, 50)));
        assert_eq!(cursor.next_entry().expect("next"), Some((6, 60)));
        assert_eq!(cursor.previous_entry().expect("previous"), Some((6, 60)));
        assert_eq!(cursor.previous_entry().expect("previous"), Some((5, 50)));
        assert_eq!(cursor.previous_entry().expect("previous"), Some((4, 40)));
    }

    #[test]
    fn test_browse_past_last_key() {
        let tree = populated(4, 0..10);
        let mut cursor = tree.browse_from(&100).expect("cursor");
        assert_eq!(cursor.next_entry().expect("next"), None);
        assert_eq!(cursor.previous_entry().expect("previous"), Some((9, 90)));
    }

    #[test]
    fn test_empty_tree_cursor() {
        let tree = populated(4, []);
        let mut cursor = tree.browse().expect("cursor");
        assert_eq!(cursor.next_entry().expect("next"), None);
        assert_eq!(cursor.previous_entry().expect("previous"), None);
        assert_eq!(cursor.leaf_id(), None);
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let tree = populated(2, 0..20);
        let mut cursor = tree.browse().expect("cursor");
        tree.store().set_fault_config(FaultConfig::always());

        let items: Vec<_> = cursor.by_ref().collect();
        assert!(matches!(items.last(), Some(Err(_))));
        assert_eq!(items.iter().filter(|item| item.is_err()).count(), 1);
        assert!(cursor.next().is_none());
    }
}
