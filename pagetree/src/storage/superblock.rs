//! Page 0 of a store file.
//!
//! ```text
//! offset  size  field
//!      0     8  magic "PGTREE01"
//!      8     4  format version
//!     12     4  page size
//!     16     1  record encoding tag
//!     24     8  page count, page 0 included
//!     32     8  first free page (0 = none)
//!     40     8  live record count
//!     48     8  root record (0 = unset)
//! ```
//!
//! Page 0 carries no page header and no checksum.

use crate::encoding::{Encoding, FormatError};
use crate::storage::page::{PAGE_SIZE, Page, PageId};

pub const MAGIC: [u8; 8] = *b"PGTREE01";

pub const FORMAT_VERSION: u32 = 1;

const MAGIC_AT: usize = 0;
const VERSION_AT: usize = 8;
const PAGE_SIZE_AT: usize = 12;
const ENCODING_AT: usize = 16;
const PAGE_COUNT_AT: usize = 24;
const FREE_HEAD_AT: usize = 32;
const RECORD_COUNT_AT: usize = 40;
const ROOT_RECORD_AT: usize = 48;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Encoding of every record in the file, fixed at creation.
    pub encoding: Encoding,
    pub page_count: u64,
    pub free_head: PageId,
    pub record_count: u64,
    pub root_record: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SuperblockError {
    #[error("not a store file (magic {:?})", String::from_utf8_lossy(.0))]
    InvalidMagic([u8; 8]),
    #[error("store format version {0} is not supported")]
    UnsupportedVersion(u32),
    #[error("store was written with {0} byte pages")]
    InvalidPageSize(u32),
    #[error("store encoding: {0}")]
    Encoding(#[from] FormatError),
}

impl Superblock {
    /// Superblock of an empty store: only page 0 exists.
    #[must_use]
    pub const fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            page_count: 1,
            free_head: 0,
            record_count: 0,
            root_record: 0,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Page {
        let mut page = Page::new();
        page.write_bytes(MAGIC_AT, &MAGIC);
        page.write_u32(VERSION_AT, FORMAT_VERSION);
        page.write_u32(PAGE_SIZE_AT, page_size_field());
        page.write_u8(ENCODING_AT, self.encoding.tag());
        page.write_u64(PAGE_COUNT_AT, self.page_count);
        page.write_u64(FREE_HEAD_AT, self.free_head);
        page.write_u64(RECORD_COUNT_AT, self.record_count);
        page.write_u64(ROOT_RECORD_AT, self.root_record);
        page
    }

    pub fn decode(page: &Page) -> Result<Self, SuperblockError> {
        let magic = page.read_bytes(MAGIC_AT, MAGIC.len());
        if magic != MAGIC {
            let mut found = [0; 8];
            found.copy_from_slice(magic);
            return Err(SuperblockError::InvalidMagic(found));
        }
        match page.read_u32(VERSION_AT) {
            FORMAT_VERSION => {}
            other => return Err(SuperblockError::UnsupportedVersion(other)),
        }
        let page_size = page.read_u32(PAGE_SIZE_AT);
        if page_size != page_size_field() {
            return Err(SuperblockError::InvalidPageSize(page_size));
        }

        Ok(Self {
            encoding: Encoding::from_tag(page.read_u8(ENCODING_AT))?,
            page_count: page.read_u64(PAGE_COUNT_AT),
            free_head: page.read_u64(FREE_HEAD_AT),
            record_count: page.read_u64(RECORD_COUNT_AT),
            root_record: page.read_u64(ROOT_RECORD_AT),
        })
    }
}

// PAGE_SIZE is 4096.
#[allow(clippy::cast_possible_truncation)]
const fn page_size_field() -> u32 {
    PAGE_SIZE as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_survive_encoding() {
        let superblock = Superblock {
            encoding: Encoding::Legacy,
            page_count: 128,
            free_head: 15,
            record_count: 42,
            root_record: 3,
        };
        let decoded = Superblock::decode(&superblock.encode()).expect("decode");
        assert_eq!(decoded, superblock);
    }

    #[test]
    fn test_zeroed_page_is_not_a_store() {
        let result = Superblock::decode(&Page::new());
        assert!(matches!(result, Err(SuperblockError::InvalidMagic(m)) if m == [0; 8]));
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut page = Superblock::new(Encoding::Compact).encode();
        page.write_u32(VERSION_AT, FORMAT_VERSION + 1);
        assert!(matches!(
            Superblock::decode(&page),
            Err(SuperblockError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_unknown_encoding_tag() {
        let mut page = Superblock::new(Encoding::Compact).encode();
        page.write_u8(ENCODING_AT, 0x7F);
        assert!(matches!(
            Superblock::decode(&page),
            Err(SuperblockError::Encoding(_))
        ));
    }
}
