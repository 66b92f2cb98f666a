//! Disk-resident B+Tree over an opaque record store.
//!
//! A tree is a set of records in a [`RecordStore`]: one record for the tree's
//! own metadata and one per node. Keys and values go through a [`Datum`]
//! codec, node keys through an optional [`CompressionProvider`], and every
//! record is written in the store's [`Encoding`].
//!
//! Two stores ship with the crate: [`FileStore`], a checksummed page file,
//! and [`MemoryStore`], a map with seeded fault injection for tests.

pub mod btree;
pub mod compression;
pub mod config;
pub mod datum;
pub mod encoding;
pub mod storage;

mod e2e_tests;
#[cfg(test)]
mod testing;

pub use btree::{BTree, BTreeError, Cursor, DEFAULT_PAGE_CAPACITY, TreeOptions};
pub use compression::CompressionProvider;
pub use config::{ConfigError, StoreConfig};
pub use datum::{Codec, Comparator, Datum};
pub use encoding::{Encoding, FormatError};
pub use storage::{FileStore, MemoryStore, RecordId, RecordStore, StorageError};
