//! Record store abstraction.
//!
//! A tree never touches pages directly. It persists its own metadata and
//! every node as opaque byte records addressed by a [`RecordId`], through the
//! [`RecordStore`] trait. Two implementations exist:
//!
//! - [`FileStore`](crate::storage::FileStore): durable, page-chained records
//!   in a single file.
//! - [`MemoryStore`](crate::storage::MemoryStore): in-memory records with
//!   seeded fault injection for tests.

use std::path::PathBuf;

use crate::encoding::Encoding;
use crate::storage::superblock::SuperblockError;

/// Identifier of a stored record. `0` is never a valid id.
pub type RecordId = u64;

/// Errors that can occur during record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// No live record has this id.
    #[error("record {0} not found")]
    NotFound(RecordId),
    /// Stored bytes failed validation.
    #[error("corruption: {0}")]
    Corruption(String),
    /// The file header could not be read.
    #[error("superblock error: {0}")]
    Superblock(#[from] SuperblockError),
    /// A store file already exists at the target path.
    #[error("store file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    /// Every representable record id is in use.
    #[error("record id space exhausted")]
    IdSpaceExhausted,
    /// Injected fault for testing.
    #[error("injected fault: {0}")]
    InjectedFault(String),
}

/// Storage of opaque byte records.
///
/// Implementations synchronize internally so one store can be shared by
/// several trees and threads. Every call is a complete operation: there is no
/// dirty-record cache above this trait, so a successful `update` is visible to
/// the next `fetch`.
pub trait RecordStore: Send + Sync {
    /// The persisted encoding every record in this store uses.
    fn encoding(&self) -> Encoding;

    /// Store a new record and return its id.
    fn insert(&self, bytes: &[u8]) -> Result<RecordId, StorageError>;

    /// Read a record back.
    ///
    /// Fails with [`StorageError::NotFound`] if `id` does not name a live record.
    fn fetch(&self, id: RecordId) -> Result<Vec<u8>, StorageError>;

    /// Replace the contents of an existing record. The id stays the same.
    fn update(&self, id: RecordId, bytes: &[u8]) -> Result<(), StorageError>;

    /// Remove a record. Its id may be reused by a later insert.
    fn delete(&self, id: RecordId) -> Result<(), StorageError>;
}
