//! Record storage used by trees.

pub mod file;
pub mod io;
pub mod memory;
pub mod page;
pub mod superblock;

pub use file::FileStore;
pub use io::{RecordId, RecordStore, StorageError};
pub use memory::{FaultConfig, MemoryStore, MemoryStoreStats};
pub use page::{PAGE_SIZE, Page, PageId};
pub use superblock::Superblock;
