//! Shared helpers for unit and scenario tests.

use std::sync::{Arc, Once};

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::btree::{BTree, TreeOptions};
use crate::datum::Datum;
use crate::encoding::Encoding;
use crate::storage::{FileStore, MemoryStore};

/// Install a test-captured subscriber once per test binary. `RUST_LOG` overrides the
/// default filter.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagetree=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_test_writer()
            .try_init();
    });
}

/// A tree over a fresh in-memory store.
pub fn memory_tree<K, V>(encoding: Encoding, options: TreeOptions) -> BTree<K, V, MemoryStore>
where
    K: Datum + Ord,
    V: Datum,
{
    init_tracing();
    let store = Arc::new(MemoryStore::new(encoding));
    BTree::create(store, options).expect("create tree in memory store")
}

/// A fresh file store inside its own temp directory. The directory is removed
/// when the returned guard drops.
pub fn temp_file_store(encoding: Encoding) -> (TempDir, FileStore) {
    init_tracing();
    let dir = tempfile::tempdir().expect("create temp dir");
    let store =
        FileStore::create(&dir.path().join("store.db"), encoding).expect("create file store");
    (dir, store)
}
