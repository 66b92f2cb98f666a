//! File-backed record store.
//!
//! Records are stored as chains of fixed-size pages. The record id is the
//! page number of the chain's head page, so it stays stable across updates
//! that grow or shrink the record.
//!
//! # Record Page Format
//!
//! ```text
//! +----------------+----------------+----------------+------------------+
//! | Page Header    | Next Page ID   | Data Length    | Data...          |
//! | (8 bytes)      | (8 bytes)      | (4 bytes)      | (variable)       |
//! +----------------+----------------+----------------+------------------+
//! ```
//!
//! The head page of a chain carries [`FLAG_RECORD_HEAD`]. Deleted pages are
//! pushed onto a free list (next pointer at the same offset) and reused before
//! the file grows.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::encoding::Encoding;
use crate::storage::io::{RecordId, RecordStore, StorageError};
use crate::storage::page::{
    FLAG_RECORD_HEAD, PAGE_SIZE, PAGE_SIZE_U64, Page, PageHeader, PageId, PageType,
};
use crate::storage::superblock::Superblock;

/// Offset of the next-page pointer in record and free pages.
const NEXT_PAGE_OFFSET: usize = PageHeader::SIZE;

/// Offset of the chunk length in record pages.
const DATA_LEN_OFFSET: usize = PageHeader::SIZE + 8;

/// Offset where record data starts.
const DATA_OFFSET: usize = PageHeader::SIZE + 12;

/// Maximum record bytes per page.
pub const DATA_PER_PAGE: usize = PAGE_SIZE - DATA_OFFSET;

/// A single-file record store.
pub struct FileStore {
    path: PathBuf,
    sync_on_write: bool,
    inner: Mutex<FileInner>,
}

struct FileInner {
    file: File,
    superblock: Superblock,
}

impl FileStore {
    /// Create a new store file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path, encoding: Encoding) -> Result<Self, StorageError> {
        if path.exists() {
            return Err(StorageError::AlreadyExists(path.to_path_buf()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let superblock = Superblock::new(encoding);
        file.write_all(superblock.encode().as_bytes())?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), %encoding, "created record store");

        Ok(Self {
            path: path.to_path_buf(),
            sync_on_write: false,
            inner: Mutex::new(FileInner { file, superblock }),
        })
    }

    /// Open an existing store file.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut page = Page::new();
        file.read_exact(page.as_bytes_mut())?;
        let superblock = Superblock::decode(&page)?;

        let file_len = file.metadata()?.len();
        if file_len < superblock.page_count * PAGE_SIZE_U64 {
            return Err(StorageError::Corruption(format!(
                "file holds {file_len} bytes but the superblock lists {} pages",
                superblock.page_count
            )));
        }

        tracing::debug!(
            path = %path.display(),
            encoding = %superblock.encoding,
            pages = superblock.page_count,
            records = superblock.record_count,
            "opened record store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            sync_on_write: false,
            inner: Mutex::new(FileInner { file, superblock }),
        })
    }

    /// Fsync after every mutating call.
    #[must_use]
    pub const fn with_sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current superblock.
    #[must_use]
    pub fn superblock(&self) -> Superblock {
        self.inner.lock().superblock
    }

    /// Number of live records.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.inner.lock().superblock.record_count
    }

    /// The well-known record registered with [`FileStore::set_root_record`].
    #[must_use]
    pub fn root_record(&self) -> Option<RecordId> {
        match self.inner.lock().superblock.root_record {
            0 => None,
            id => Some(id),
        }
    }

    /// Register a well-known record so it can be found after reopening.
    pub fn set_root_record(&self, id: Option<RecordId>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.superblock.root_record = id.unwrap_or(0);
        inner.write_superblock()?;
        self.finish_write(&inner)
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        let inner = self.inner.lock();
        inner.file.sync_all()?;
        tracing::debug!(path = %self.path.display(), "synced record store");
        Ok(())
    }

    /// Flush the superblock, sync, and release the file.
    pub fn close(self) -> Result<(), StorageError> {
        let mut inner = self.inner.into_inner();
        inner.write_superblock()?;
        inner.file.sync_all()?;
        tracing::debug!(path = %self.path.display(), "closed record store");
        Ok(())
    }

    fn finish_write(&self, inner: &FileInner) -> Result<(), StorageError> {
        if self.sync_on_write {
            inner.file.sync_all()?;
        }
        Ok(())
    }
}

impl FileInner {
    fn check_bounds(&self, page_id: PageId) -> Result<(), StorageError> {
        if page_id == 0 || page_id >= self.superblock.page_count {
            return Err(StorageError::NotFound(page_id));
        }
        Ok(())
    }

    fn read_page(&mut self, page_id: PageId) -> Result<Page, StorageError> {
        let mut page = Page::new();
        self.file.seek(SeekFrom::Start(page_id * PAGE_SIZE_U64))?;
        self.file.read_exact(page.as_bytes_mut())?;
        page.verify_checksum()
            .map_err(|e| StorageError::Corruption(format!("page {page_id}: {e}")))?;
        Ok(page)
    }

    fn write_page(&mut self, page_id: PageId, page: &mut Page) -> Result<(), StorageError> {
        page.seal();
        self.file.seek(SeekFrom::Start(page_id * PAGE_SIZE_U64))?;
        self.file.write_all(page.as_bytes())?;
        Ok(())
    }

    fn write_superblock(&mut self) -> Result<(), StorageError> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(self.superblock.encode().as_bytes())?;
        Ok(())
    }

    /// Take a page from the free list, or grow the file by one page.
    fn allocate_page(&mut self) -> Result<PageId, StorageError> {
        let head = self.superblock.free_head;
        if head != 0 {
            let page = self.read_page(head)?;
            if page.header().map(|h| h.page_type) != Ok(PageType::Free) {
                return Err(StorageError::Corruption(format!(
                    "free list entry {head} is not a free page"
                )));
            }
            self.superblock.free_head = page.read_u64(NEXT_PAGE_OFFSET);
            return Ok(head);
        }

        let page_id = self.superblock.page_count;
        let new_total = page_id
            .checked_add(1)
            .ok_or(StorageError::IdSpaceExhausted)?;
        self.file.set_len(new_total * PAGE_SIZE_U64)?;
        self.superblock.page_count = new_total;
        Ok(page_id)
    }

    fn free_page(&mut self, page_id: PageId) -> Result<(), StorageError> {
        let mut page = Page::with_header(PageType::Free, 0);
        page.write_u64(NEXT_PAGE_OFFSET, self.superblock.free_head);
        self.write_page(page_id, &mut page)?;
        self.superblock.free_head = page_id;
        Ok(())
    }

    /// Read the head page of a record, rejecting anything that is not one.
    fn read_head(&mut self, id: RecordId) -> Result<Page, StorageError> {
        self.check_bounds(id)?;
        let page = self.read_page(id)?;
        let header = page
            .header()
            .map_err(|e| StorageError::Corruption(format!("page {id}: {e}")))?;
        if header.page_type != PageType::Record || header.flags & FLAG_RECORD_HEAD == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(page)
    }

    /// Page ids of the chain starting at `id`, head first.
    fn chain(&mut self, id: RecordId) -> Result<Vec<PageId>, StorageError> {
        let mut pages = vec![id];
        let mut next = self.read_head(id)?.read_u64(NEXT_PAGE_OFFSET);
        while next != 0 {
            if pages.len() as u64 >= self.superblock.page_count {
                return Err(StorageError::Corruption(format!(
                    "record {id} chain does not terminate"
                )));
            }
            let page = self.read_continuation(id, next)?;
            pages.push(next);
            next = page.read_u64(NEXT_PAGE_OFFSET);
        }
        Ok(pages)
    }

    fn read_continuation(&mut self, id: RecordId, page_id: PageId) -> Result<Page, StorageError> {
        if page_id == 0 || page_id >= self.superblock.page_count {
            return Err(StorageError::Corruption(format!(
                "record {id} links to page {page_id} beyond the file"
            )));
        }
        let page = self.read_page(page_id)?;
        let header = page
            .header()
            .map_err(|e| StorageError::Corruption(format!("page {page_id}: {e}")))?;
        if header.page_type != PageType::Record || header.flags & FLAG_RECORD_HEAD != 0 {
            return Err(StorageError::Corruption(format!(
                "record {id} links to page {page_id}, which is not a continuation page"
            )));
        }
        Ok(page)
    }

    /// Allocate `count` more pages onto `pages`. If one allocation fails, the
    /// pages taken by this call go back to the free list.
    fn allocate_pages(
        &mut self,
        pages: &mut Vec<PageId>,
        count: usize,
    ) -> Result<(), StorageError> {
        let start = pages.len();
        for _ in 0..count {
            match self.allocate_page() {
                Ok(page_id) => pages.push(page_id),
                Err(e) => {
                    let taken = pages.split_off(start);
                    self.release(&taken);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Push pages allocated for a failed write back onto the free list,
    /// newest first, so the list is restored to its previous order.
    fn release(&mut self, pages: &[PageId]) {
        for &page_id in pages.iter().rev() {
            if let Err(e) = self.free_page(page_id) {
                tracing::warn!(page_id, error = %e, "could not release page after failed write");
                return;
            }
        }
    }

    /// Write `bytes` across `pages`, which must hold exactly enough pages.
    ///
    /// Pages from `fresh_from` on were just allocated. Pages are written last
    /// to first, so until an existing page is rewritten nothing links to the
    /// fresh ones; a failure in that window releases them.
    fn write_chain(
        &mut self,
        pages: &[PageId],
        bytes: &[u8],
        fresh_from: usize,
    ) -> Result<(), StorageError> {
        let chunks: Vec<&[u8]> = bytes.chunks(DATA_PER_PAGE).collect();
        for (i, &page_id) in pages.iter().enumerate().rev() {
            let chunk = chunks.get(i).copied().unwrap_or_default();
            let flags = if i == 0 { FLAG_RECORD_HEAD } else { 0 };
            let mut page = Page::with_header(PageType::Record, flags);
            page.write_u64(NEXT_PAGE_OFFSET, pages.get(i + 1).copied().unwrap_or(0));
            // chunk.len() <= DATA_PER_PAGE < u32::MAX
            #[allow(clippy::cast_possible_truncation)]
            page.write_u32(DATA_LEN_OFFSET, chunk.len() as u32);
            page.write_bytes(DATA_OFFSET, chunk);
            if let Err(e) = self.write_page(page_id, &mut page) {
                if i >= fresh_from {
                    self.release(pages.get(fresh_from..).unwrap_or_default());
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Number of pages a record of `len` bytes occupies. Empty records take one.
const fn pages_for(len: usize) -> usize {
    if len == 0 { 1 } else { len.div_ceil(DATA_PER_PAGE) }
}

impl RecordStore for FileStore {
    fn encoding(&self) -> Encoding {
        self.inner.lock().superblock.encoding
    }

    fn insert(&self, bytes: &[u8]) -> Result<RecordId, StorageError> {
        let mut inner = self.inner.lock();
        let mut pages = Vec::new();
        inner.allocate_pages(&mut pages, pages_for(bytes.len()))?;
        inner.write_chain(&pages, bytes, 0)?;
        inner.superblock.record_count += 1;
        inner.write_superblock()?;
        self.finish_write(&inner)?;

        let id = pages[0];
        tracing::trace!(id, len = bytes.len(), pages = pages.len(), "inserted record");
        Ok(id)
    }

    fn fetch(&self, id: RecordId) -> Result<Vec<u8>, StorageError> {
        let mut inner = self.inner.lock();
        let mut page = inner.read_head(id)?;
        let mut bytes = Vec::new();
        let mut hops = 0u64;
        loop {
            let len = page.read_u32(DATA_LEN_OFFSET) as usize;
            if len > DATA_PER_PAGE {
                return Err(StorageError::Corruption(format!(
                    "record {id} page claims {len} bytes"
                )));
            }
            bytes.extend_from_slice(page.read_bytes(DATA_OFFSET, len));

            let next = page.read_u64(NEXT_PAGE_OFFSET);
            if next == 0 {
                break;
            }
            hops += 1;
            if hops >= inner.superblock.page_count {
                return Err(StorageError::Corruption(format!(
                    "record {id} chain does not terminate"
                )));
            }
            page = inner.read_continuation(id, next)?;
        }
        Ok(bytes)
    }

    fn update(&self, id: RecordId, bytes: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let mut pages = inner.chain(id)?;
        let existing = pages.len();
        let needed = pages_for(bytes.len());

        inner.allocate_pages(&mut pages, needed.saturating_sub(existing))?;
        let surplus = pages.split_off(needed);

        inner.write_chain(&pages, bytes, existing)?;
        for page_id in surplus {
            inner.free_page(page_id)?;
        }
        inner.write_superblock()?;
        self.finish_write(&inner)?;

        tracing::trace!(id, len = bytes.len(), pages = pages.len(), "updated record");
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let pages = inner.chain(id)?;
        for &page_id in &pages {
            inner.free_page(page_id)?;
        }
        inner.superblock.record_count = inner.superblock.record_count.saturating_sub(1);
        if inner.superblock.root_record == id {
            inner.superblock.root_record = 0;
        }
        inner.write_superblock()?;
        self.finish_write(&inner)?;

        tracing::trace!(id, pages = pages.len(), "deleted record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_store(dir: &Path) -> FileStore {
        FileStore::create(&dir.join("test.db"), Encoding::Compact).expect("should create")
    }

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().expect("should create temp dir");
        let path = dir.path().join("test.db");

        let store = FileStore::create(&path, Encoding::Legacy).expect("should create");
        let id = store.insert(b"hello").expect("should insert");
        store.set_root_record(Some(id)).expect("should set root");
        store.close().expect("should close");

        let store = FileStore::open(&path).expect("should open");
        assert_eq!(store.encoding(), Encoding::Legacy);
        assert_eq!(store.root_record(), Some(id));
        assert_eq!(store.record_count(), 1);
        assert_eq!(store.fetch(id).expect("should fetch"), b"hello");
    }

    #[test]
    fn test_create_already_exists() {
        let dir = tempdir().expect("should create temp dir");
        let path = dir.path().join("test.db");
        FileStore::create(&path, Encoding::Compact).expect("should create");

        let result = FileStore::create(&path, Encoding::Compact);
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
    }

    #[test]
    fn test_multi_page_record() {
        let dir = tempdir().expect("should create temp dir");
        let store = create_store(dir.path());

        let big: Vec<u8> = (0..DATA_PER_PAGE * 2 + 17).map(|i| (i % 251) as u8).collect();
        let id = store.insert(&big).expect("should insert");
        assert_eq!(store.fetch(id).expect("should fetch"), big);
        assert_eq!(store.superblock().page_count, 4);
    }

    #[test]
    fn test_update_keeps_id_and_reuses_pages() {
        let dir = tempdir().expect("should create temp dir");
        let store = create_store(dir.path());

        let id = store.insert(&vec![1u8; DATA_PER_PAGE * 3]).expect("should insert");
        store.update(id, b"small").expect("should shrink");
        assert_eq!(store.fetch(id).expect("should fetch"), b"small");

        // The two freed pages are reused before the file grows.
        let pages_before = store.superblock().page_count;
        let other = store.insert(&vec![2u8; DATA_PER_PAGE + 1]).expect("should insert");
        assert_eq!(store.superblock().page_count, pages_before);
        assert_eq!(store.fetch(other).expect("should fetch").len(), DATA_PER_PAGE + 1);
    }

    #[test]
    fn test_failed_allocation_returns_pages_to_free_list() {
        let dir = tempdir().expect("should create temp dir");
        let store = create_store(dir.path());

        let spare = store.insert(&vec![4u8; DATA_PER_PAGE * 2]).expect("should insert");
        let kept = store.insert(b"kept").expect("should insert");
        store.delete(spare).expect("should delete");
        let before = store.superblock();

        // Leave no room to grow the file.
        store.inner.lock().superblock.page_count = u64::MAX;
        let result = store.insert(&vec![5u8; DATA_PER_PAGE * 3]);
        assert!(matches!(result, Err(StorageError::IdSpaceExhausted)));
        let result = store.update(kept, &vec![6u8; DATA_PER_PAGE * 4]);
        assert!(matches!(result, Err(StorageError::IdSpaceExhausted)));
        store.inner.lock().superblock.page_count = before.page_count;

        assert_eq!(store.superblock(), before);
        assert_eq!(store.fetch(kept).expect("should fetch"), b"kept");

        // Both spare pages are still on the free list.
        let reused = store.insert(&vec![7u8; DATA_PER_PAGE * 2]).expect("should insert");
        assert_eq!(store.superblock().page_count, before.page_count);
        assert_eq!(store.fetch(reused).expect("should fetch").len(), DATA_PER_PAGE * 2);
    }

    #[test]
    fn test_empty_record() {
        let dir = tempdir().expect("should create temp dir");
        let store = create_store(dir.path());

        let id = store.insert(&[]).expect("should insert");
        assert!(store.fetch(id).expect("should fetch").is_empty());
    }

    #[test]
    fn test_missing_records() {
        let dir = tempdir().expect("should create temp dir");
        let store = create_store(dir.path());

        assert!(matches!(store.fetch(0), Err(StorageError::NotFound(0))));
        assert!(matches!(store.fetch(99), Err(StorageError::NotFound(99))));

        let id = store.insert(&vec![3u8; DATA_PER_PAGE + 10]).expect("should insert");
        // The continuation page is not a record on its own.
        assert!(matches!(store.fetch(id + 1), Err(StorageError::NotFound(_))));

        store.delete(id).expect("should delete");
        assert!(matches!(store.fetch(id), Err(StorageError::NotFound(_))));
        assert!(matches!(store.delete(id), Err(StorageError::NotFound(_))));
        assert!(matches!(store.update(id, b"x"), Err(StorageError::NotFound(_))));
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let dir = tempdir().expect("should create temp dir");
        let path = dir.path().join("test.db");
        let store = FileStore::create(&path, Encoding::Compact).expect("should create");
        let id = store.insert(b"intact").expect("should insert");
        store.close().expect("should close");

        let mut file = OpenOptions::new()
            .write(true)
            .open(&path)
            .expect("should open file");
        file.seek(SeekFrom::Start(id * PAGE_SIZE_U64 + DATA_OFFSET as u64))
            .expect("should seek");
        file.write_all(b"X").expect("should write");
        drop(file);

        let store = FileStore::open(&path).expect("should open");
        assert!(matches!(store.fetch(id), Err(StorageError::Corruption(_))));
    }
}
