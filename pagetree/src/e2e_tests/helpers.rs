//! Common helpers for end-to-end tests.

use crate::btree::{BTree, Cursor};
use crate::datum::Datum;
use crate::storage::RecordStore;

/// Drain a cursor forwards into a vector.
pub fn collect_forward<K, V, S>(cursor: Cursor<K, V, S>) -> Vec<(K, V)>
where
    K: Datum + Ord,
    V: Datum,
    S: RecordStore,
{
    cursor
        .collect::<Result<Vec<_>, _>>()
        .expect("cursor should step without errors")
}

/// Every key of the tree in cursor order.
pub fn keys<K, V, S>(tree: &BTree<K, V, S>) -> Vec<K>
where
    K: Datum + Ord,
    V: Datum,
    S: RecordStore,
{
    collect_forward(tree.browse().expect("browse"))
        .into_iter()
        .map(|(key, _)| key)
        .collect()
}
