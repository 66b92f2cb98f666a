//! B-tree node types, serialization, and the recursive split/merge engine.
//!
//! Whether a record holds a leaf or an internal node is not stored: it follows
//! from the height at which the record is reached (height 1 is the leaf level).
//!
//! # Node Record Format
//!
//! ```text
//! +--------+----------------------+--------------------+------------------------+
//! | size   | prev, next (leaf)    | keys (one session) | values (leaf) /        |
//! |        |                      |                    | children (internal)    |
//! +--------+----------------------+--------------------+------------------------+
//! ```
//!
//! - `size`: entries in a leaf, separator keys in an internal node. Legacy
//!   stores use an `i32`, compact stores a varint.
//! - `prev`/`next`: sibling leaf ids, `0` when absent. Legacy `i64`, compact varint.
//! - keys: fed in order through one compression session of the tree's
//!   provider (identity framing when none is set).
//! - values: identity framing (`i32` length + bytes).
//! - children: `size + 1` record ids. Legacy `i64`, compact varint.
//!
//! Every non-root node holds at least `page_capacity / 2` entries (leaf) or
//! separator keys (internal), so a non-root internal node always has at least
//! two children.

use crate::btree::BTreeError;
use crate::compression::{CompressionProvider, identity};
use crate::datum::{Codec, Comparator, Datum, decode_datum, encode_datum};
use crate::encoding::{Encoding, FormatError, Reader, Writer};
use crate::storage::{RecordId, RecordStore};

/// A leaf entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry<K, V> {
    pub key: K,
    pub value: V,
}

/// A leaf node: sorted entries plus links to its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode<K, V> {
    pub prev: Option<RecordId>,
    pub next: Option<RecordId>,
    pub entries: Vec<LeafEntry<K, V>>,
}

impl<K: Ord, V> LeafNode<K, V> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            prev: None,
            next: None,
            entries: Vec::new(),
        }
    }

    /// Position of `key`, or where it would be inserted.
    pub fn find_index(&self, key: &K, comparator: Comparator) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| comparator.compare(&e.key, key))
    }

    /// Index of the first entry not less than `key`.
    #[must_use]
    pub fn lower_bound(&self, key: &K, comparator: Comparator) -> usize {
        self.find_index(key, comparator).unwrap_or_else(|i| i)
    }

    /// Split off the upper half of the entries into a new right sibling.
    ///
    /// The caller links the siblings once the right node has an id.
    #[must_use]
    pub fn split(&mut self) -> Self {
        let mid = self.entries.len() / 2;
        Self {
            prev: None,
            next: self.next,
            entries: self.entries.split_off(mid),
        }
    }
}

impl<K: Ord, V> Default for LeafNode<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// An internal node.
///
/// Stores N separator keys and N+1 child record ids.
/// `children[i]` contains keys < `keys[i]`
/// `children[i+1]` contains keys >= `keys[i]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode<K> {
    pub keys: Vec<K>,
    pub children: Vec<RecordId>,
}

impl<K: Ord> InternalNode<K> {
    /// A new root above a split: `left` and `right` separated by `separator`.
    #[must_use]
    pub fn with_children(left: RecordId, separator: K, right: RecordId) -> Self {
        Self {
            keys: vec![separator],
            children: vec![left, right],
        }
    }

    /// Index of the child whose subtree may contain `key`: the child before
    /// the first separator strictly greater than `key`.
    #[must_use]
    pub fn child_index(&self, key: &K, comparator: Comparator) -> usize {
        match self.keys.binary_search_by(|k| comparator.compare(k, key)) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// Split the node, returning the median key and the new right node.
    #[must_use]
    pub fn split(&mut self) -> (K, Self) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let median = self.keys.remove(mid);
        (
            median,
            Self {
                keys: right_keys,
                children: right_children,
            },
        )
    }
}

/// Everything needed to (de)serialize a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeFormat {
    pub encoding: Encoding,
    pub key_codec: Option<Codec>,
    pub value_codec: Option<Codec>,
    pub compression: Option<CompressionProvider>,
}

impl NodeFormat {
    fn provider(&self) -> CompressionProvider {
        self.compression.unwrap_or(CompressionProvider::Identity)
    }

    fn write_size(&self, out: &mut Writer, len: usize) -> Result<(), FormatError> {
        let size = u32::try_from(len).map_err(|_| FormatError::TooLong {
            what: "node size",
            len,
            max: u32::MAX as usize,
        })?;
        self.encoding.write_int(out, size)
    }

    fn read_size(&self, input: &mut Reader<'_>, capacity: usize) -> Result<usize, FormatError> {
        let size = self.encoding.read_int(input)? as usize;
        if size > capacity {
            return Err(FormatError::Malformed(format!(
                "node of {size} entries exceeds page capacity {capacity}"
            )));
        }
        Ok(size)
    }

    fn write_keys<'k, K: Datum + 'k>(
        &self,
        out: &mut Writer,
        keys: impl Iterator<Item = &'k K>,
    ) -> Result<(), FormatError> {
        let encoded = keys
            .map(|key| encode_datum(key, self.key_codec))
            .collect::<Result<Vec<_>, _>>()?;
        let mut compressor = self.provider().compressor(out);
        for bytes in &encoded {
            compressor.compress_next_group(Some(bytes.as_slice()))?;
        }
        compressor.finish_compression()
    }

    fn read_keys<K: Datum>(
        &self,
        input: &mut Reader<'_>,
        count: usize,
    ) -> Result<Vec<K>, FormatError> {
        let mut decompressor = self.provider().decompressor(input);
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            let bytes = decompressor
                .decompress_next_group()?
                .ok_or_else(|| FormatError::Malformed("absent key in node".to_string()))?;
            keys.push(decode_datum(&bytes, self.key_codec)?);
        }
        Ok(keys)
    }

    fn write_link(&self, out: &mut Writer, link: Option<RecordId>) -> Result<(), FormatError> {
        self.encoding.write_long(out, link.unwrap_or(0))
    }

    fn read_link(&self, input: &mut Reader<'_>) -> Result<Option<RecordId>, FormatError> {
        Ok(match self.encoding.read_long(input)? {
            0 => None,
            id => Some(id),
        })
    }

    pub fn encode_leaf<K: Datum, V: Datum>(
        &self,
        leaf: &LeafNode<K, V>,
    ) -> Result<Vec<u8>, FormatError> {
        let mut out = Writer::new();
        self.write_size(&mut out, leaf.entries.len())?;
        self.write_link(&mut out, leaf.prev)?;
        self.write_link(&mut out, leaf.next)?;
        self.write_keys(&mut out, leaf.entries.iter().map(|e| &e.key))?;
        for entry in &leaf.entries {
            let bytes = encode_datum(&entry.value, self.value_codec)?;
            identity::write_group(&mut out, Some(bytes.as_slice()))?;
        }
        Ok(out.into_inner())
    }

    pub fn decode_leaf<K: Datum, V: Datum>(
        &self,
        bytes: &[u8],
        capacity: usize,
    ) -> Result<LeafNode<K, V>, FormatError> {
        let mut input = Reader::new(bytes);
        let size = self.read_size(&mut input, capacity)?;
        let prev = self.read_link(&mut input)?;
        let next = self.read_link(&mut input)?;
        let keys: Vec<K> = self.read_keys(&mut input, size)?;

        let mut entries = Vec::with_capacity(size);
        for key in keys {
            let bytes = identity::read_group(&mut input)?
                .ok_or_else(|| FormatError::Malformed("absent value in leaf".to_string()))?;
            let value = decode_datum(&bytes, self.value_codec)?;
            entries.push(LeafEntry { key, value });
        }
        expect_exhausted(&input, "leaf")?;

        Ok(LeafNode {
            prev,
            next,
            entries,
        })
    }

    pub fn encode_internal<K: Datum>(
        &self,
        node: &InternalNode<K>,
    ) -> Result<Vec<u8>, FormatError> {
        let mut out = Writer::new();
        self.write_size(&mut out, node.keys.len())?;
        self.write_keys(&mut out, node.keys.iter())?;
        for &child in &node.children {
            self.encoding.write_long(&mut out, child)?;
        }
        Ok(out.into_inner())
    }

    pub fn decode_internal<K: Datum>(
        &self,
        bytes: &[u8],
        capacity: usize,
    ) -> Result<InternalNode<K>, FormatError> {
        let mut input = Reader::new(bytes);
        let size = self.read_size(&mut input, capacity)?;
        let keys = self.read_keys(&mut input, size)?;
        let children = (0..=size)
            .map(|_| match self.encoding.read_long(&mut input)? {
                0 => Err(FormatError::Malformed("internal node child id 0".to_string())),
                id => Ok(id),
            })
            .collect::<Result<Vec<_>, _>>()?;
        expect_exhausted(&input, "internal node")?;

        Ok(InternalNode { keys, children })
    }

    pub fn load_leaf<S: RecordStore, K: Datum, V: Datum>(
        &self,
        store: &S,
        id: RecordId,
        capacity: usize,
    ) -> Result<LeafNode<K, V>, BTreeError> {
        let bytes = store.fetch(id)?;
        Ok(self.decode_leaf(&bytes, capacity)?)
    }

    pub fn load_internal<S: RecordStore, K: Datum>(
        &self,
        store: &S,
        id: RecordId,
        capacity: usize,
    ) -> Result<InternalNode<K>, BTreeError> {
        let bytes = store.fetch(id)?;
        Ok(self.decode_internal(&bytes, capacity)?)
    }
}

fn expect_exhausted(input: &Reader<'_>, what: &str) -> Result<(), FormatError> {
    if input.is_exhausted() {
        Ok(())
    } else {
        Err(FormatError::Malformed(format!(
            "{} trailing bytes after {what}",
            input.remaining()
        )))
    }
}

/// Result of inserting into a subtree.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome<K, V> {
    /// A new entry was added without splitting this node.
    Inserted,
    /// The key was present; carries the value it had before the call.
    Existing(V),
    /// A new entry was added and this node split. The caller must link
    /// `right` after this node, separated by `separator`.
    Split { separator: K, right: RecordId },
}

/// Result of removing from a subtree.
#[derive(Debug, PartialEq, Eq)]
pub enum RemoveOutcome<V> {
    /// The key was not present. Nothing was written.
    Absent,
    /// The entry was removed. `remaining` is the size of the subtree's root
    /// node afterwards (entries for a leaf, separators for an internal node).
    Removed { value: V, remaining: usize },
}

/// Immutable per-call view of a tree, passed down the recursion.
pub struct TreeContext<'a, S> {
    pub store: &'a S,
    pub comparator: Comparator,
    pub page_capacity: usize,
    pub format: NodeFormat,
}

impl<S: RecordStore> TreeContext<'_, S> {
    /// Minimum size of a non-root node.
    #[must_use]
    pub const fn min_size(&self) -> usize {
        self.page_capacity / 2
    }

    pub fn load_leaf<K: Datum, V: Datum>(
        &self,
        id: RecordId,
    ) -> Result<LeafNode<K, V>, BTreeError> {
        self.format.load_leaf(self.store, id, self.page_capacity)
    }

    pub fn load_internal<K: Datum>(&self, id: RecordId) -> Result<InternalNode<K>, BTreeError> {
        self.format.load_internal(self.store, id, self.page_capacity)
    }

    pub fn create_leaf<K: Datum, V: Datum>(
        &self,
        leaf: &LeafNode<K, V>,
    ) -> Result<RecordId, BTreeError> {
        let id = self.store.insert(&self.format.encode_leaf(leaf)?)?;
        tracing::trace!(id, entries = leaf.entries.len(), "created leaf");
        Ok(id)
    }

    pub fn store_leaf<K: Datum, V: Datum>(
        &self,
        id: RecordId,
        leaf: &LeafNode<K, V>,
    ) -> Result<(), BTreeError> {
        self.store.update(id, &self.format.encode_leaf(leaf)?)?;
        tracing::trace!(id, entries = leaf.entries.len(), "wrote leaf");
        Ok(())
    }

    pub fn create_internal<K: Datum>(
        &self,
        node: &InternalNode<K>,
    ) -> Result<RecordId, BTreeError> {
        let id = self.store.insert(&self.format.encode_internal(node)?)?;
        tracing::trace!(id, keys = node.keys.len(), "created internal node");
        Ok(id)
    }

    pub fn store_internal<K: Datum>(
        &self,
        id: RecordId,
        node: &InternalNode<K>,
    ) -> Result<(), BTreeError> {
        self.store.update(id, &self.format.encode_internal(node)?)?;
        tracing::trace!(id, keys = node.keys.len(), "wrote internal node");
        Ok(())
    }

    /// Point the `prev` link of leaf `id` at `prev`.
    fn relink_prev<K: Datum, V: Datum>(
        &self,
        id: RecordId,
        prev: RecordId,
    ) -> Result<(), BTreeError> {
        let mut leaf: LeafNode<K, V> = self.load_leaf(id)?;
        leaf.prev = Some(prev);
        self.store_leaf(id, &leaf)
    }
}

/// Insert `key` into the subtree rooted at `id`, which sits `height` levels
/// above the leaves (1 = leaf).
pub fn insert<S, K, V>(
    ctx: &TreeContext<'_, S>,
    id: RecordId,
    height: u32,
    key: K,
    value: V,
    replace: bool,
) -> Result<InsertOutcome<K, V>, BTreeError>
where
    S: RecordStore,
    K: Datum + Ord,
    V: Datum,
{
    if height <= 1 {
        return insert_into_leaf(ctx, id, key, value, replace);
    }

    let mut node: InternalNode<K> = ctx.load_internal(id)?;
    let idx = node.child_index(&key, ctx.comparator);
    let child = node.children[idx];
    let (separator, right) = match insert(ctx, child, height - 1, key, value, replace)? {
        InsertOutcome::Split { separator, right } => (separator, right),
        other => return Ok(other),
    };

    node.keys.insert(idx, separator);
    node.children.insert(idx + 1, right);
    if node.keys.len() <= ctx.page_capacity {
        ctx.store_internal(id, &node)?;
        return Ok(InsertOutcome::Inserted);
    }

    let (median, right_node) = node.split();
    let right_id = ctx.create_internal(&right_node)?;
    ctx.store_internal(id, &node)?;
    tracing::trace!(left = id, right = right_id, "split internal node");
    Ok(InsertOutcome::Split {
        separator: median,
        right: right_id,
    })
}

fn insert_into_leaf<S, K, V>(
    ctx: &TreeContext<'_, S>,
    id: RecordId,
    key: K,
    value: V,
    replace: bool,
) -> Result<InsertOutcome<K, V>, BTreeError>
where
    S: RecordStore,
    K: Datum + Ord,
    V: Datum,
{
    let mut leaf: LeafNode<K, V> = ctx.load_leaf(id)?;
    match leaf.find_index(&key, ctx.comparator) {
        Ok(i) if replace => {
            let old = std::mem::replace(&mut leaf.entries[i].value, value);
            ctx.store_leaf(id, &leaf)?;
            return Ok(InsertOutcome::Existing(old));
        }
        Ok(i) => return Ok(InsertOutcome::Existing(leaf.entries[i].value.clone())),
        Err(i) => leaf.entries.insert(i, LeafEntry { key, value }),
    }

    if leaf.entries.len() <= ctx.page_capacity {
        ctx.store_leaf(id, &leaf)?;
        return Ok(InsertOutcome::Inserted);
    }

    let mut right = leaf.split();
    right.prev = Some(id);
    let right_id = ctx.create_leaf(&right)?;
    if let Some(next) = right.next {
        ctx.relink_prev::<K, V>(next, right_id)?;
    }
    leaf.next = Some(right_id);
    ctx.store_leaf(id, &leaf)?;
    tracing::trace!(left = id, right = right_id, "split leaf");

    let separator = right.entries[0].key.clone();
    Ok(InsertOutcome::Split {
        separator,
        right: right_id,
    })
}

/// Remove `key` from the subtree rooted at `id`.
pub fn remove<S, K, V>(
    ctx: &TreeContext<'_, S>,
    id: RecordId,
    height: u32,
    key: &K,
) -> Result<RemoveOutcome<V>, BTreeError>
where
    S: RecordStore,
    K: Datum + Ord,
    V: Datum,
{
    if height <= 1 {
        let mut leaf: LeafNode<K, V> = ctx.load_leaf(id)?;
        let Ok(i) = leaf.find_index(key, ctx.comparator) else {
            return Ok(RemoveOutcome::Absent);
        };
        let entry = leaf.entries.remove(i);
        ctx.store_leaf(id, &leaf)?;
        return Ok(RemoveOutcome::Removed {
            value: entry.value,
            remaining: leaf.entries.len(),
        });
    }

    let mut node: InternalNode<K> = ctx.load_internal(id)?;
    let idx = node.child_index(key, ctx.comparator);
    let outcome = remove::<S, K, V>(ctx, node.children[idx], height - 1, key)?;
    let RemoveOutcome::Removed { value, remaining } = outcome else {
        return Ok(RemoveOutcome::Absent);
    };

    if remaining < ctx.min_size() {
        rebalance::<S, K, V>(ctx, &mut node, idx, height - 1)?;
        ctx.store_internal(id, &node)?;
    }
    Ok(RemoveOutcome::Removed {
        value,
        remaining: node.keys.len(),
    })
}

/// Restore the minimum size of `parent.children[idx]`, which sits at
/// `child_height`: borrow from the left sibling, else from the right sibling,
/// else merge with the left sibling, else with the right one.
///
/// `parent` is updated in memory; the caller persists it.
fn rebalance<S, K, V>(
    ctx: &TreeContext<'_, S>,
    parent: &mut InternalNode<K>,
    idx: usize,
    child_height: u32,
) -> Result<(), BTreeError>
where
    S: RecordStore,
    K: Datum + Ord,
    V: Datum,
{
    let min = ctx.min_size();
    let has_left = idx > 0;
    let has_right = idx + 1 < parent.children.len();

    if child_height == 1 {
        let child_id = parent.children[idx];
        let mut child: LeafNode<K, V> = ctx.load_leaf(child_id)?;

        let mut left = None;
        if has_left {
            let left_id = parent.children[idx - 1];
            let mut sibling: LeafNode<K, V> = ctx.load_leaf(left_id)?;
            if sibling.entries.len() > min {
                if let Some(entry) = sibling.entries.pop() {
                    parent.keys[idx - 1] = entry.key.clone();
                    child.entries.insert(0, entry);
                }
                ctx.store_leaf(left_id, &sibling)?;
                ctx.store_leaf(child_id, &child)?;
                tracing::trace!(from = left_id, to = child_id, "borrowed from left leaf");
                return Ok(());
            }
            left = Some((left_id, sibling));
        }

        if has_right {
            let right_id = parent.children[idx + 1];
            let mut sibling: LeafNode<K, V> = ctx.load_leaf(right_id)?;
            if sibling.entries.len() > min {
                child.entries.push(sibling.entries.remove(0));
                parent.keys[idx] = sibling.entries[0].key.clone();
                ctx.store_leaf(right_id, &sibling)?;
                ctx.store_leaf(child_id, &child)?;
                tracing::trace!(from = right_id, to = child_id, "borrowed from right leaf");
                return Ok(());
            }
            if left.is_none() {
                return merge_leaves(ctx, parent, idx, (child_id, child), (right_id, sibling));
            }
        }

        return match left {
            Some(left) => merge_leaves(ctx, parent, idx - 1, left, (child_id, child)),
            // A non-root internal node always has two children.
            None => Ok(()),
        };
    }

    let child_id = parent.children[idx];
    let mut child: InternalNode<K> = ctx.load_internal(child_id)?;

    let mut left = None;
    if has_left {
        let left_id = parent.children[idx - 1];
        let mut sibling: InternalNode<K> = ctx.load_internal(left_id)?;
        if sibling.keys.len() > min {
            if let (Some(key), Some(grandchild)) = (sibling.keys.pop(), sibling.children.pop()) {
                let separator = std::mem::replace(&mut parent.keys[idx - 1], key);
                child.keys.insert(0, separator);
                child.children.insert(0, grandchild);
            }
            ctx.store_internal(left_id, &sibling)?;
            ctx.store_internal(child_id, &child)?;
            tracing::trace!(from = left_id, to = child_id, "borrowed from left internal node");
            return Ok(());
        }
        left = Some((left_id, sibling));
    }

    if has_right {
        let right_id = parent.children[idx + 1];
        let mut sibling: InternalNode<K> = ctx.load_internal(right_id)?;
        if sibling.keys.len() > min {
            let key = sibling.keys.remove(0);
            let separator = std::mem::replace(&mut parent.keys[idx], key);
            child.keys.push(separator);
            child.children.push(sibling.children.remove(0));
            ctx.store_internal(right_id, &sibling)?;
            ctx.store_internal(child_id, &child)?;
            tracing::trace!(from = right_id, to = child_id, "borrowed from right internal node");
            return Ok(());
        }
        if left.is_none() {
            return merge_internal(ctx, parent, idx, (child_id, child), (right_id, sibling));
        }
    }

    match left {
        Some(left) => merge_internal(ctx, parent, idx - 1, left, (child_id, child)),
        None => Ok(()),
    }
}

/// Fold the right leaf into the left one and drop separator `sep` from `parent`.
fn merge_leaves<S, K, V>(
    ctx: &TreeContext<'_, S>,
    parent: &mut InternalNode<K>,
    sep: usize,
    (left_id, mut left): (RecordId, LeafNode<K, V>),
    (right_id, right): (RecordId, LeafNode<K, V>),
) -> Result<(), BTreeError>
where
    S: RecordStore,
    K: Datum + Ord,
    V: Datum,
{
    left.entries.extend(right.entries);
    left.next = right.next;
    if let Some(next) = right.next {
        ctx.relink_prev::<K, V>(next, left_id)?;
    }
    ctx.store_leaf(left_id, &left)?;
    ctx.store.delete(right_id)?;

    parent.keys.remove(sep);
    parent.children.remove(sep + 1);
    tracing::trace!(left = left_id, right = right_id, "merged leaves");
    Ok(())
}

/// Fold the right internal node into the left one, pulling separator `sep`
/// down from `parent`.
fn merge_internal<S, K>(
    ctx: &TreeContext<'_, S>,
    parent: &mut InternalNode<K>,
    sep: usize,
    (left_id, mut left): (RecordId, InternalNode<K>),
    (right_id, right): (RecordId, InternalNode<K>),
) -> Result<(), BTreeError>
where
    S: RecordStore,
    K: Datum + Ord,
{
    left.keys.push(parent.keys.remove(sep));
    left.keys.extend(right.keys);
    left.children.extend(right.children);
    ctx.store_internal(left_id, &left)?;
    ctx.store.delete(right_id)?;

    parent.children.remove(sep + 1);
    tracing::trace!(left = left_id, right = right_id, "merged internal nodes");
    Ok(())
}

/// Descend to the leaf that would hold `key`.
pub fn find_leaf<S, K, V>(
    ctx: &TreeContext<'_, S>,
    mut id: RecordId,
    height: u32,
    key: &K,
) -> Result<(RecordId, LeafNode<K, V>), BTreeError>
where
    S: RecordStore,
    K: Datum + Ord,
    V: Datum,
{
    for _ in 1..height {
        let node: InternalNode<K> = ctx.load_internal(id)?;
        id = node.children[node.child_index(key, ctx.comparator)];
    }
    Ok((id, ctx.load_leaf(id)?))
}

/// Descend along the first (or last) child at every level.
pub fn edge_leaf<S, K, V>(
    ctx: &TreeContext<'_, S>,
    mut id: RecordId,
    height: u32,
    last: bool,
) -> Result<(RecordId, LeafNode<K, V>), BTreeError>
where
    S: RecordStore,
    K: Datum + Ord,
    V: Datum,
{
    for _ in 1..height {
        let node: InternalNode<K> = ctx.load_internal(id)?;
        let child = if last {
            node.children.last()
        } else {
            node.children.first()
        };
        id = *child.ok_or_else(|| {
            FormatError::Malformed(format!("internal node {id} has no children"))
        })?;
    }
    Ok((id, ctx.load_leaf(id)?))
}

/// Delete every record of the subtree rooted at `id`.
pub fn free_subtree<S, K>(
    ctx: &TreeContext<'_, S>,
    id: RecordId,
    height: u32,
) -> Result<(), BTreeError>
where
    S: RecordStore,
    K: Datum + Ord,
{
    if height > 1 {
        let node: InternalNode<K> = ctx.load_internal(id)?;
        for child in node.children {
            free_subtree::<S, K>(ctx, child, height - 1)?;
        }
    }
    ctx.store.delete(id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn format(encoding: Encoding, compression: Option<CompressionProvider>) -> NodeFormat {
        NodeFormat {
            encoding,
            key_codec: None,
            value_codec: None,
            compression,
        }
    }

    fn leaf(keys: &[u64]) -> LeafNode<u64, String> {
        LeafNode {
            prev: None,
            next: None,
            entries: keys
                .iter()
                .map(|&key| LeafEntry {
                    key,
                    value: format!("v{key}"),
                })
                .collect(),
        }
    }

    #[test]
    fn test_leaf_node_roundtrip() {
        for encoding in [Encoding::Legacy, Encoding::Compact] {
            for compression in [None, Some(CompressionProvider::BINARY)] {
                let fmt = format(encoding, compression);
                let mut node = leaf(&[1, 2, 3, 1000]);
                node.prev = Some(7);
                node.next = Some(9);

                let bytes = fmt.encode_leaf(&node).expect("should encode");
                let decoded: LeafNode<u64, String> =
                    fmt.decode_leaf(&bytes, 16).expect("should decode");
                assert_eq!(decoded, node);
            }
        }
    }

    #[test]
    fn test_legacy_leaf_layout() {
        let fmt = format(Encoding::Legacy, None);
        let node = leaf(&[5]);
        let bytes = fmt.encode_leaf(&node).expect("should encode");

        let mut expected = Writer::new();
        expected.write_i32(1); // size
        expected.write_i64(0); // prev
        expected.write_i64(0); // next
        expected.write_i32(8);
        expected.write_bytes(&5u64.to_be_bytes());
        expected.write_i32(2);
        expected.write_bytes(b"v5");
        assert_eq!(bytes, expected.into_inner());
    }

    #[test]
    fn test_internal_node_roundtrip() {
        for encoding in [Encoding::Legacy, Encoding::Compact] {
            let fmt = format(encoding, Some(CompressionProvider::BINARY));
            let node = InternalNode {
                keys: vec![10u64, 20, 30],
                children: vec![2, 3, 4, 5],
            };
            let bytes = fmt.encode_internal(&node).expect("should encode");
            let decoded: InternalNode<u64> =
                fmt.decode_internal(&bytes, 16).expect("should decode");
            assert_eq!(decoded, node);
        }
    }

    #[test]
    fn test_decode_rejects_oversized_node() {
        let fmt = format(Encoding::Compact, None);
        let bytes = fmt.encode_leaf(&leaf(&[1, 2, 3])).expect("should encode");
        let result: Result<LeafNode<u64, String>, _> = fmt.decode_leaf(&bytes, 2);
        assert!(matches!(result, Err(FormatError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let fmt = format(Encoding::Compact, None);
        let mut bytes = fmt.encode_leaf(&leaf(&[1])).expect("should encode");
        bytes.push(0);
        let result: Result<LeafNode<u64, String>, _> = fmt.decode_leaf(&bytes, 16);
        assert!(matches!(result, Err(FormatError::Malformed(_))));
    }

    #[test]
    fn test_internal_node_find_child() {
        let node = InternalNode {
            keys: vec![10u64, 20, 30],
            children: vec![1, 2, 3, 4],
        };
        let cmp = Comparator::Natural;
        assert_eq!(node.child_index(&5, cmp), 0);
        assert_eq!(node.child_index(&10, cmp), 1);
        assert_eq!(node.child_index(&15, cmp), 1);
        assert_eq!(node.child_index(&30, cmp), 3);
        assert_eq!(node.child_index(&35, cmp), 3);
    }

    #[test]
    fn test_leaf_node_split() {
        let mut node = leaf(&[1, 2, 3, 4, 5]);
        node.next = Some(42);
        let right = node.split();
        assert_eq!(node.entries.len(), 2);
        assert_eq!(right.entries[0].key, 3);
        assert_eq!(right.next, Some(42));
    }

    #[test]
    fn test_internal_node_split() {
        // Capacity 4 overflows at 5 keys; both halves keep the minimum of 2.
        let mut node = InternalNode {
            keys: vec![10u64, 20, 30, 40, 50],
            children: vec![1, 2, 3, 4, 5, 6],
        };
        let (median, right) = node.split();
        assert_eq!(median, 30);
        assert_eq!(node.keys, vec![10, 20]);
        assert_eq!(node.children, vec![1, 2, 3]);
        assert_eq!(right.keys, vec![40, 50]);
        assert_eq!(right.children, vec![4, 5, 6]);
    }

    fn context(store: &MemoryStore, capacity: usize) -> TreeContext<'_, MemoryStore> {
        TreeContext {
            store,
            comparator: Comparator::Natural,
            page_capacity: capacity,
            format: format(store.encoding(), None),
        }
    }

    #[test]
    fn test_leaf_split_links_siblings() {
        let store = MemoryStore::new(Encoding::Compact);
        let ctx = context(&store, 2);
        let root = ctx.create_leaf(&leaf(&[1, 2])).expect("should create");

        let outcome = insert(&ctx, root, 1, 3u64, "v3".to_string(), false).expect("should insert");
        let InsertOutcome::Split { separator, right } = outcome else {
            panic!("expected a split, got {outcome:?}");
        };
        assert_eq!(separator, 2);

        let left: LeafNode<u64, String> = ctx.load_leaf(root).expect("left");
        let right_leaf: LeafNode<u64, String> = ctx.load_leaf(right).expect("right");
        assert_eq!(left.next, Some(right));
        assert_eq!(right_leaf.prev, Some(root));
        assert_eq!(right_leaf.entries.len(), 2);
    }

    #[test]
    fn test_insert_existing_without_replace_writes_nothing() {
        let store = MemoryStore::new(Encoding::Compact);
        let ctx = context(&store, 4);
        let root = ctx.create_leaf(&leaf(&[1])).expect("should create");
        store.reset_stats();

        let outcome = insert(&ctx, root, 1, 1u64, "other".to_string(), false).expect("insert");
        assert_eq!(outcome, InsertOutcome::Existing("v1".to_string()));
        assert_eq!(store.stats().updates, 0);
    }

    #[test]
    fn test_remove_merges_underflowing_leaf() {
        let store = MemoryStore::new(Encoding::Compact);
        let ctx = context(&store, 4);

        let mut left = leaf(&[1, 2]);
        let mut right = leaf(&[3, 4]);
        let left_id = ctx.create_leaf(&left).expect("left");
        let right_id = ctx.create_leaf(&right).expect("right");
        left.next = Some(right_id);
        right.prev = Some(left_id);
        ctx.store_leaf(left_id, &left).expect("link left");
        ctx.store_leaf(right_id, &right).expect("link right");
        let root = ctx
            .create_internal(&InternalNode::with_children(left_id, 3u64, right_id))
            .expect("root");

        let outcome: RemoveOutcome<String> = remove(&ctx, root, 2, &4u64).expect("remove");
        assert_eq!(
            outcome,
            RemoveOutcome::Removed {
                value: "v4".to_string(),
                remaining: 0
            }
        );

        let merged: LeafNode<u64, String> = ctx.load_leaf(left_id).expect("merged");
        let keys: Vec<u64> = merged.entries.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(merged.next, None);
        assert!(store.fetch(right_id).is_err());
    }

    #[test]
    fn test_remove_borrows_from_right_leaf() {
        let store = MemoryStore::new(Encoding::Compact);
        let ctx = context(&store, 4);

        let left_id = ctx.create_leaf(&leaf(&[1, 2])).expect("left");
        let right_id = ctx.create_leaf(&leaf(&[3, 4, 5])).expect("right");
        let root = ctx
            .create_internal(&InternalNode::with_children(left_id, 3u64, right_id))
            .expect("root");

        let outcome: RemoveOutcome<String> = remove(&ctx, root, 2, &1u64).expect("remove");
        assert!(matches!(outcome, RemoveOutcome::Removed { remaining: 1, .. }));

        let parent: InternalNode<u64> = ctx.load_internal(root).expect("root");
        assert_eq!(parent.keys, vec![4]);
        let left: LeafNode<u64, String> = ctx.load_leaf(left_id).expect("left");
        let keys: Vec<u64> = left.entries.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![2, 3]);
    }

    /// Create one leaf per group, linked in order.
    fn linked_leaves(ctx: &TreeContext<'_, MemoryStore>, groups: &[&[u64]]) -> Vec<RecordId> {
        let ids: Vec<RecordId> = groups
            .iter()
            .map(|keys| ctx.create_leaf(&leaf(keys)).expect("create leaf"))
            .collect();
        for (i, (&id, keys)) in ids.iter().zip(groups).enumerate() {
            let mut node = leaf(keys);
            node.prev = i.checked_sub(1).map(|p| ids[p]);
            node.next = ids.get(i + 1).copied();
            ctx.store_leaf(id, &node).expect("link leaf");
        }
        ids
    }

    fn leaf_keys(ctx: &TreeContext<'_, MemoryStore>, id: RecordId) -> Vec<u64> {
        let node: LeafNode<u64, String> = ctx.load_leaf(id).expect("load leaf");
        node.entries.iter().map(|e| e.key).collect()
    }

    #[test]
    fn test_remove_borrows_from_left_leaf() {
        let store = MemoryStore::new(Encoding::Compact);
        let ctx = context(&store, 4);
        let ids = linked_leaves(&ctx, &[&[1, 2, 3], &[4, 5]]);
        let root = ctx
            .create_internal(&InternalNode::with_children(ids[0], 4u64, ids[1]))
            .expect("root");

        let outcome: RemoveOutcome<String> = remove(&ctx, root, 2, &5u64).expect("remove");
        assert!(matches!(outcome, RemoveOutcome::Removed { remaining: 1, .. }));

        let parent: InternalNode<u64> = ctx.load_internal(root).expect("root");
        assert_eq!(parent.keys, vec![3]);
        assert_eq!(leaf_keys(&ctx, ids[0]), vec![1, 2]);
        assert_eq!(leaf_keys(&ctx, ids[1]), vec![3, 4]);
    }

    #[test]
    fn test_underflowing_internal_node_borrows_from_left() {
        let store = MemoryStore::new(Encoding::Compact);
        let ctx = context(&store, 2);
        let l = linked_leaves(&ctx, &[&[1], &[2], &[3], &[4], &[5]]);
        let left = ctx
            .create_internal(&InternalNode {
                keys: vec![2u64, 3],
                children: vec![l[0], l[1], l[2]],
            })
            .expect("left");
        let right = ctx
            .create_internal(&InternalNode::with_children(l[3], 5u64, l[4]))
            .expect("right");
        let root = ctx
            .create_internal(&InternalNode::with_children(left, 4u64, right))
            .expect("root");

        // Leaves 4 and 5 merge, leaving `right` with no keys.
        let outcome: RemoveOutcome<String> = remove(&ctx, root, 3, &5u64).expect("remove");
        assert!(matches!(outcome, RemoveOutcome::Removed { remaining: 1, .. }));

        let root_node: InternalNode<u64> = ctx.load_internal(root).expect("root");
        assert_eq!(root_node.keys, vec![3]);
        let left_node: InternalNode<u64> = ctx.load_internal(left).expect("left");
        assert_eq!(left_node.keys, vec![2]);
        assert_eq!(left_node.children, vec![l[0], l[1]]);
        let right_node: InternalNode<u64> = ctx.load_internal(right).expect("right");
        assert_eq!(right_node.keys, vec![4]);
        assert_eq!(right_node.children, vec![l[2], l[3]]);
        assert!(store.fetch(l[4]).is_err());
    }

    #[test]
    fn test_underflowing_internal_nodes_merge() {
        let store = MemoryStore::new(Encoding::Compact);
        let ctx = context(&store, 2);
        let l = linked_leaves(&ctx, &[&[1], &[2], &[3], &[4]]);
        let left = ctx
            .create_internal(&InternalNode::with_children(l[0], 2u64, l[1]))
            .expect("left");
        let right = ctx
            .create_internal(&InternalNode::with_children(l[2], 4u64, l[3]))
            .expect("right");
        let root = ctx
            .create_internal(&InternalNode::with_children(left, 3u64, right))
            .expect("root");

        let outcome: RemoveOutcome<String> = remove(&ctx, root, 3, &4u64).expect("remove");
        assert!(matches!(outcome, RemoveOutcome::Removed { remaining: 0, .. }));

        let root_node: InternalNode<u64> = ctx.load_internal(root).expect("root");
        assert!(root_node.keys.is_empty());
        assert_eq!(root_node.children, vec![left]);
        let merged: InternalNode<u64> = ctx.load_internal(left).expect("merged");
        assert_eq!(merged.keys, vec![2, 3]);
        assert_eq!(merged.children, vec![l[0], l[1], l[2]]);
        assert!(store.fetch(right).is_err());
        assert!(store.fetch(l[3]).is_err());

        let last: LeafNode<u64, String> = ctx.load_leaf(l[2]).expect("last leaf");
        assert_eq!(last.next, None);
    }

    #[test]
    fn test_remove_absent_key() {
        let store = MemoryStore::new(Encoding::Compact);
        let ctx = context(&store, 4);
        let root = ctx.create_leaf(&leaf(&[1, 2])).expect("should create");
        store.reset_stats();

        let outcome: RemoveOutcome<String> = remove(&ctx, root, 1, &9u64).expect("remove");
        assert_eq!(outcome, RemoveOutcome::Absent);
        assert_eq!(store.stats().updates, 0);
    }
}
