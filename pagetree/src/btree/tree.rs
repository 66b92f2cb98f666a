//! B-tree handle: tree-wide metadata and root-level structural changes.
//!
//! Node-level work lives in [`node`](crate::btree::node). The tree grows a
//! new root when the old one splits and collapses the root when it runs out of
//! separators (or, for a leaf root, out of entries).
//!
//! # Concurrency
//!
//! `insert`, `remove`, and `set_compression_provider` run under one mutex for
//! their whole duration. Lookups and cursor creation hold it only long enough
//! to snapshot the root. A cursor is not synchronized with later mutations and
//! may observe a stale view if the tree changes while it is in use.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::btree::node::{
    self, InsertOutcome, InternalNode, LeafEntry, LeafNode, NodeFormat, RemoveOutcome, TreeContext,
};
use crate::btree::{BTreeError, Cursor, TreeRecord};
use crate::compression::CompressionProvider;
use crate::datum::{Codec, Comparator, Datum};
use crate::encoding::Encoding;
use crate::storage::{RecordId, RecordStore};

/// Page capacity used when none is configured.
pub const DEFAULT_PAGE_CAPACITY: u32 = 16;

/// Parameters for creating a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    pub comparator: Comparator,
    pub key_codec: Option<Codec>,
    pub value_codec: Option<Codec>,
    pub page_capacity: u32,
    pub compression: Option<CompressionProvider>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            comparator: Comparator::Natural,
            key_codec: None,
            value_codec: None,
            page_capacity: DEFAULT_PAGE_CAPACITY,
            compression: None,
        }
    }
}

impl TreeOptions {
    #[must_use]
    pub const fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    #[must_use]
    pub const fn with_key_codec(mut self, codec: Codec) -> Self {
        self.key_codec = Some(codec);
        self
    }

    #[must_use]
    pub const fn with_value_codec(mut self, codec: Codec) -> Self {
        self.value_codec = Some(codec);
        self
    }

    #[must_use]
    pub const fn with_page_capacity(mut self, page_capacity: u32) -> Self {
        self.page_capacity = page_capacity;
        self
    }

    #[must_use]
    pub const fn with_compression(mut self, provider: CompressionProvider) -> Self {
        self.compression = Some(provider);
        self
    }
}

/// Mutable metadata, guarded by the tree lock.
#[derive(Debug, Clone, Copy)]
struct TreeState {
    height: u32,
    root: Option<RecordId>,
    entry_count: u64,
    compression: Option<CompressionProvider>,
}

/// A B+Tree stored in a [`RecordStore`].
pub struct BTree<K, V, S> {
    store: Arc<S>,
    record_id: RecordId,
    encoding: Encoding,
    comparator: Comparator,
    key_codec: Option<Codec>,
    value_codec: Option<Codec>,
    page_capacity: u32,
    state: Mutex<TreeState>,
    _entries: PhantomData<fn() -> (K, V)>,
}

impl<K, V, S> BTree<K, V, S>
where
    K: Datum + Ord,
    V: Datum,
    S: RecordStore,
{
    /// Create an empty tree and persist its record.
    pub fn create(store: Arc<S>, options: TreeOptions) -> Result<Self, BTreeError> {
        let capacity = options.page_capacity;
        if capacity < 2 || capacity % 2 != 0 || i32::try_from(capacity).is_err() {
            return Err(BTreeError::InvalidArgument(format!(
                "page capacity must be an even number of at least 2, got {capacity}"
            )));
        }
        check_codec::<K>("key", options.key_codec)
            .and_then(|()| check_codec::<V>("value", options.value_codec))
            .map_err(BTreeError::InvalidArgument)?;

        let encoding = store.encoding();
        let record = TreeRecord {
            comparator: options.comparator,
            key_codec: options.key_codec,
            value_codec: options.value_codec,
            height: 0,
            root: None,
            page_capacity: capacity,
            entry_count: 0,
            compression: options.compression,
        };
        let record_id = store.insert(&record.encode(encoding)?)?;

        tracing::debug!(
            record_id,
            page_capacity = capacity,
            comparator = ?options.comparator,
            %encoding,
            "created tree"
        );

        Ok(Self::from_record(store, record_id, encoding, record))
    }

    /// Load a tree from its record.
    pub fn load(store: Arc<S>, record_id: RecordId) -> Result<Self, BTreeError> {
        let encoding = store.encoding();
        let bytes = store.fetch(record_id)?;
        let record = TreeRecord::decode(&bytes, encoding)?;
        check_codec::<K>("key", record.key_codec)
            .and_then(|()| check_codec::<V>("value", record.value_codec))
            .map_err(crate::encoding::FormatError::Malformed)?;

        tracing::debug!(
            record_id,
            height = record.height,
            entries = record.entry_count,
            "loaded tree"
        );

        Ok(Self::from_record(store, record_id, encoding, record))
    }

    fn from_record(
        store: Arc<S>,
        record_id: RecordId,
        encoding: Encoding,
        record: TreeRecord,
    ) -> Self {
        Self {
            store,
            record_id,
            encoding,
            comparator: record.comparator,
            key_codec: record.key_codec,
            value_codec: record.value_codec,
            page_capacity: record.page_capacity,
            state: Mutex::new(TreeState {
                height: record.height,
                root: record.root,
                entry_count: record.entry_count,
                compression: record.compression,
            }),
            _entries: PhantomData,
        }
    }

    fn format(&self, state: &TreeState) -> NodeFormat {
        NodeFormat {
            encoding: self.encoding,
            key_codec: self.key_codec,
            value_codec: self.value_codec,
            compression: state.compression,
        }
    }

    fn context(&self, state: &TreeState) -> TreeContext<'_, S> {
        TreeContext {
            store: &*self.store,
            comparator: self.comparator,
            page_capacity: self.page_capacity as usize,
            format: self.format(state),
        }
    }

    fn persist(&self, state: &TreeState) -> Result<(), BTreeError> {
        let record = TreeRecord {
            comparator: self.comparator,
            key_codec: self.key_codec,
            value_codec: self.value_codec,
            height: state.height,
            root: state.root,
            page_capacity: self.page_capacity,
            entry_count: state.entry_count,
            compression: state.compression,
        };
        self.store
            .update(self.record_id, &record.encode(self.encoding)?)?;
        Ok(())
    }

    /// Insert an entry.
    ///
    /// Returns the value previously stored under `key`, if any. When `replace`
    /// is false an existing value is left in place and still returned.
    pub fn insert(&self, key: K, value: V, replace: bool) -> Result<Option<V>, BTreeError> {
        let mut state = self.state.lock();
        let ctx = self.context(&state);

        let Some(root) = state.root else {
            let leaf = LeafNode {
                prev: None,
                next: None,
                entries: vec![LeafEntry { key, value }],
            };
            state.root = Some(ctx.create_leaf(&leaf)?);
            state.height = 1;
            state.entry_count = 1;
            self.persist(&state)?;
            tracing::debug!(record_id = self.record_id, "created root leaf");
            return Ok(None);
        };

        let outcome = node::insert(&ctx, root, state.height, key, value, replace)?;
        let split = match outcome {
            InsertOutcome::Existing(previous) => return Ok(Some(previous)),
            InsertOutcome::Inserted => None,
            InsertOutcome::Split { separator, right } => Some((separator, right)),
        };

        let entry_count = state.entry_count.checked_add(1).ok_or_else(|| {
            BTreeError::CapacityExceeded("entry count overflows 64 bits".to_string())
        })?;
        if let Some((separator, right)) = split {
            let grown = InternalNode::with_children(root, separator, right);
            let new_root = ctx.create_internal(&grown)?;
            state.root = Some(new_root);
            state.height += 1;
            tracing::debug!(
                record_id = self.record_id,
                root = new_root,
                height = state.height,
                "root split, tree grew"
            );
        }
        state.entry_count = entry_count;
        self.persist(&state)?;
        Ok(None)
    }

    /// Remove an entry, returning its value if it was present.
    pub fn remove(&self, key: &K) -> Result<Option<V>, BTreeError> {
        let mut state = self.state.lock();
        let Some(root) = state.root else {
            return Ok(None);
        };
        let ctx = self.context(&state);

        let outcome = node::remove::<S, K, V>(&ctx, root, state.height, key)?;
        let RemoveOutcome::Removed { value, remaining } = outcome else {
            return Ok(None);
        };

        if remaining == 0 {
            let new_root = if state.height > 1 {
                let old_root: InternalNode<K> = ctx.load_internal(root)?;
                old_root.children.first().copied()
            } else {
                None
            };
            self.store.delete(root)?;
            state.root = new_root;
            state.height -= 1;
            tracing::debug!(
                record_id = self.record_id,
                height = state.height,
                "root collapsed, tree shrank"
            );
        }
        state.entry_count = state.entry_count.saturating_sub(1);
        self.persist(&state)?;
        Ok(Some(value))
    }

    /// Look up the value stored under `key`.
    pub fn find(&self, key: &K) -> Result<Option<V>, BTreeError> {
        let (state, format) = self.snapshot();
        let Some(root) = state.root else {
            return Ok(None);
        };
        let ctx = TreeContext {
            store: &*self.store,
            comparator: self.comparator,
            page_capacity: self.page_capacity as usize,
            format,
        };

        let (_, leaf) = node::find_leaf::<S, K, V>(&ctx, root, state.height, key)?;
        let idx = leaf.lower_bound(key, self.comparator);
        Ok(leaf
            .entries
            .into_iter()
            .nth(idx)
            .filter(|entry| self.comparator.compare(&entry.key, key).is_eq())
            .map(|entry| entry.value))
    }

    /// The first entry whose key is not less than `key`.
    pub fn find_greater_or_equal(&self, key: &K) -> Result<Option<(K, V)>, BTreeError> {
        self.browse_from(key)?.next_entry()
    }

    /// A cursor positioned before the first entry.
    pub fn browse(&self) -> Result<Cursor<K, V, S>, BTreeError> {
        self.cursor(|ctx, root, height| {
            let (id, leaf) = node::edge_leaf(ctx, root, height, false)?;
            Ok((id, leaf, 0))
        })
    }

    /// A cursor positioned before the first entry not less than `key`.
    pub fn browse_from(&self, key: &K) -> Result<Cursor<K, V, S>, BTreeError> {
        self.cursor(|ctx, root, height| {
            let (id, leaf) = node::find_leaf(ctx, root, height, key)?;
            let idx = leaf.lower_bound(key, ctx.comparator);
            Ok((id, leaf, idx))
        })
    }

    /// A cursor positioned after the last entry, for stepping backwards.
    pub fn browse_after_last(&self) -> Result<Cursor<K, V, S>, BTreeError> {
        self.cursor(|ctx, root, height| {
            let (id, leaf) = node::edge_leaf::<S, K, V>(ctx, root, height, true)?;
            let idx = leaf.entries.len();
            Ok((id, leaf, idx))
        })
    }

    fn cursor<F>(&self, position: F) -> Result<Cursor<K, V, S>, BTreeError>
    where
        F: FnOnce(
            &TreeContext<'_, S>,
            RecordId,
            u32,
        ) -> Result<(RecordId, LeafNode<K, V>, usize), BTreeError>,
    {
        let (state, format) = self.snapshot();
        let capacity = self.page_capacity as usize;
        let Some(root) = state.root else {
            return Ok(Cursor::empty(Arc::clone(&self.store), format, capacity));
        };
        let ctx = TreeContext {
            store: &*self.store,
            comparator: self.comparator,
            page_capacity: capacity,
            format,
        };
        let (id, leaf, idx) = position(&ctx, root, state.height)?;
        Ok(Cursor::new(Arc::clone(&self.store), format, capacity, id, leaf, idx))
    }

    fn snapshot(&self) -> (TreeState, NodeFormat) {
        let state = *self.state.lock();
        (state, self.format(&state))
    }

    /// Delete every node record and the tree record itself.
    pub fn delete(self) -> Result<(), BTreeError> {
        let state = self.state.lock();
        if let Some(root) = state.root {
            let ctx = self.context(&state);
            node::free_subtree::<S, K>(&ctx, root, state.height)?;
        }
        self.store.delete(self.record_id)?;
        tracing::debug!(record_id = self.record_id, "deleted tree");
        Ok(())
    }

    /// Exact number of entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.state.lock().entry_count
    }

    /// Number of entries as a 32-bit count.
    ///
    /// Fails with [`BTreeError::CapacityExceeded`] once the tree holds more
    /// than `i32::MAX` entries; use [`BTree::entry_count`] instead.
    pub fn size(&self) -> Result<u32, BTreeError> {
        let count = self.entry_count();
        i32::try_from(count)
            .ok()
            .and_then(|count| u32::try_from(count).ok())
            .ok_or_else(|| {
                BTreeError::CapacityExceeded(format!(
                    "{count} entries do not fit a 32-bit size; use entry_count"
                ))
            })
    }

    #[must_use]
    pub const fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// Levels from the root to the leaves; 0 for an empty tree.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.state.lock().height
    }

    #[must_use]
    pub const fn page_capacity(&self) -> u32 {
        self.page_capacity
    }

    #[must_use]
    pub const fn comparator(&self) -> Comparator {
        self.comparator
    }

    #[must_use]
    pub const fn key_codec(&self) -> Option<Codec> {
        self.key_codec
    }

    #[must_use]
    pub const fn value_codec(&self) -> Option<Codec> {
        self.value_codec
    }

    #[must_use]
    pub fn compression_provider(&self) -> Option<CompressionProvider> {
        self.state.lock().compression
    }

    /// Change how node keys are compressed. Only allowed while the tree is empty.
    pub fn set_compression_provider(
        &self,
        provider: Option<CompressionProvider>,
    ) -> Result<(), BTreeError> {
        let mut state = self.state.lock();
        if state.entry_count != 0 {
            return Err(BTreeError::InvalidState(format!(
                "cannot change compression of a tree holding {} entries",
                state.entry_count
            )));
        }
        if state.compression != provider {
            state.compression = provider;
            self.persist(&state)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[cfg(test)]
impl<K, V, S> BTree<K, V, S>
where
    K: Datum + Ord,
    V: Datum,
    S: RecordStore,
{
    /// Walk every node and panic unless the tree is balanced and ordered, its
    /// leaves are linked both ways, and it holds exactly `entry_count` entries.
    pub(crate) fn assert_well_formed(&self) {
        let (state, format) = self.snapshot();
        let Some(root) = state.root else {
            assert_eq!(state.height, 0, "empty tree has height 0");
            assert_eq!(state.entry_count, 0, "empty tree has no entries");
            return;
        };
        let ctx = TreeContext {
            store: &*self.store,
            comparator: self.comparator,
            page_capacity: self.page_capacity as usize,
            format,
        };

        let mut leaves = Vec::new();
        let total =
            check_subtree::<S, K, V>(&ctx, root, state.height, true, (None, None), &mut leaves);
        assert_eq!(total, state.entry_count, "entry count matches the leaves");

        for (i, &(id, prev, next)) in leaves.iter().enumerate() {
            let expected_prev = i.checked_sub(1).map(|p| leaves[p].0);
            let expected_next = leaves.get(i + 1).map(|&(id, _, _)| id);
            assert_eq!(prev, expected_prev, "prev link of leaf {id}");
            assert_eq!(next, expected_next, "next link of leaf {id}");
        }
    }
}

/// Check the subtree at `id` and return how many entries it holds. Every key
/// must fall in `[low, high)`. Leaves are appended to `leaves` in key order.
#[cfg(test)]
fn check_subtree<S, K, V>(
    ctx: &TreeContext<'_, S>,
    id: RecordId,
    height: u32,
    is_root: bool,
    (low, high): (Option<&K>, Option<&K>),
    leaves: &mut Vec<(RecordId, Option<RecordId>, Option<RecordId>)>,
) -> u64
where
    S: RecordStore,
    K: Datum + Ord,
    V: Datum,
{
    let cmp = ctx.comparator;
    let in_range = |key: &K| {
        low.is_none_or(|low| cmp.compare(low, key).is_le())
            && high.is_none_or(|high| cmp.compare(key, high).is_lt())
    };
    let min = if is_root { 1 } else { ctx.min_size() };
    let occupancy = min..=ctx.page_capacity;

    if height == 1 {
        let leaf: LeafNode<K, V> = ctx.load_leaf(id).expect("load leaf");
        let len = leaf.entries.len();
        assert!(occupancy.contains(&len), "leaf {id} holds {len} entries");
        assert!(
            leaf.entries
                .windows(2)
                .all(|pair| cmp.compare(&pair[0].key, &pair[1].key).is_lt()),
            "leaf {id} keys are sorted"
        );
        assert!(
            leaf.entries.iter().all(|entry| in_range(&entry.key)),
            "leaf {id} keys lie between its separators"
        );
        leaves.push((id, leaf.prev, leaf.next));
        return u64::try_from(len).expect("leaf length fits u64");
    }

    let node: InternalNode<K> = ctx.load_internal(id).expect("load internal node");
    let keys = node.keys.len();
    assert!(occupancy.contains(&keys), "internal node {id} holds {keys} keys");
    assert_eq!(node.children.len(), keys + 1, "internal node {id} child count");
    assert!(
        node.keys.windows(2).all(|pair| cmp.compare(&pair[0], &pair[1]).is_lt()),
        "internal node {id} keys are sorted"
    );
    assert!(
        node.keys.iter().all(|key| in_range(key)),
        "internal node {id} keys lie between its separators"
    );

    node.children
        .iter()
        .enumerate()
        .map(|(i, &child)| {
            let child_low = if i == 0 { low } else { node.keys.get(i - 1) };
            let child_high = node.keys.get(i).or(high);
            check_subtree::<S, K, V>(
                ctx,
                child,
                height - 1,
                false,
                (child_low, child_high),
                leaves,
            )
        })
        .sum()
}

fn check_codec<T: Datum>(role: &str, codec: Option<Codec>) -> Result<(), String> {
    match codec {
        Some(codec) if !T::supports(codec) => Err(format!(
            "{role} codec {codec:?} does not support {}",
            std::any::type_name::<T>()
        )),
        _ => Ok(()),
    }
}

impl<K, V, S> std::fmt::Debug for BTree<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.lock();
        f.debug_struct("BTree")
            .field("record_id", &self.record_id)
            .field("height", &state.height)
            .field("entry_count", &state.entry_count)
            .field("page_capacity", &self.page_capacity)
            .finish_non_exhaustive()
    }
}
