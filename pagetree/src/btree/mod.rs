//! Disk-resident B+Tree over a [`RecordStore`](crate::storage::RecordStore).
//!
//! The tree itself and every node are stored as separate records. Leaves hold
//! `(key, value)` entries and are doubly linked for cursor stepping; internal
//! nodes hold separator keys and child record ids.

pub mod cursor;
pub mod node;
pub mod record;
pub mod tree;

pub use cursor::Cursor;
pub use record::TreeRecord;
pub use tree::{BTree, DEFAULT_PAGE_CAPACITY, TreeOptions};

use crate::encoding::FormatError;
use crate::storage::{RecordId, StorageError};

/// Errors that can occur during B-tree operations.
#[derive(Debug, thiserror::Error)]
pub enum BTreeError {
    /// A caller-supplied argument was rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The operation is not allowed in the tree's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A tree or node record does not exist.
    #[error("record {0} not found")]
    NotFound(RecordId),
    /// A count does not fit the requested representation.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    /// The record store failed.
    #[error("storage failure: {0}")]
    Storage(StorageError),
    /// Persisted bytes do not match the expected format.
    #[error("unsupported persisted format: {0}")]
    Format(#[from] FormatError),
}

impl From<StorageError> for BTreeError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}
