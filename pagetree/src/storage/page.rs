//! Fixed-size pages, the unit the file store reads and writes.
//!
//! Every page except page 0 starts with an 8 byte header:
//!
//! ```text
//! 0      1       2          6        8
//! +------+-------+----------+--------+
//! | kind | flags | crc32 LE | unused |
//! +------+-------+----------+--------+
//! ```
//!
//! The checksum covers the whole page with its own four bytes skipped.
//! Multi-byte fields in the page body are little-endian.

use std::fmt;
use std::ops::Range;

pub const PAGE_SIZE: usize = 4096;

pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// Index of a page in the store file. Page 0 is the superblock.
pub type PageId = u64;

/// Set on the first page of a record chain.
pub const FLAG_RECORD_HEAD: u8 = 0x01;

const KIND_BYTE: usize = 0;
const FLAGS_BYTE: usize = 1;
const CHECKSUM: Range<usize> = 2..6;

/// What a page holds. A zeroed page has no kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Record = 0x02,
    Free = 0x03,
}

impl PageType {
    fn from_byte(byte: u8) -> Result<Self, PageError> {
        match byte {
            0x02 => Ok(Self::Record),
            0x03 => Ok(Self::Free),
            other => Err(PageError::UnknownKind(other)),
        }
    }
}

/// Decoded page header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub flags: u8,
}

impl PageHeader {
    /// Bytes reserved for the header at the start of a page.
    pub const SIZE: usize = 8;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("unknown page kind {0:#04x}")]
    UnknownKind(u8),
    #[error("page checksum is {stored:#010x} but contents hash to {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
}

/// One page of bytes, heap allocated.
pub struct Page {
    bytes: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// A zero-filled page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0; PAGE_SIZE]),
        }
    }

    /// A zero-filled page with its kind and flags set.
    #[must_use]
    pub fn with_header(page_type: PageType, flags: u8) -> Self {
        let mut page = Self::new();
        page.bytes[KIND_BYTE] = page_type as u8;
        page.bytes[FLAGS_BYTE] = flags;
        page
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..]
    }

    /// Decode the kind and flags bytes.
    pub fn header(&self) -> Result<PageHeader, PageError> {
        Ok(PageHeader {
            page_type: PageType::from_byte(self.bytes[KIND_BYTE])?,
            flags: self.bytes[FLAGS_BYTE],
        })
    }

    /// Borrow `len` bytes at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range runs past the end of the page.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.bytes[offset..offset + len]
    }

    /// # Panics
    ///
    /// Panics if `data` runs past the end of the page.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0; N];
        out.copy_from_slice(self.read_bytes(offset, N));
        out
    }

    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }

    #[must_use]
    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.array(offset))
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.array(offset))
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    fn content_hash(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.bytes[..CHECKSUM.start]);
        hasher.update(&self.bytes[CHECKSUM.end..]);
        hasher.finalize()
    }

    /// Store the checksum of the current contents. Call last, before the
    /// page is written out.
    pub fn seal(&mut self) {
        let hash = self.content_hash();
        self.write_u32(CHECKSUM.start, hash);
    }

    /// Check a page read back from disk.
    pub fn verify_checksum(&self) -> Result<(), PageError> {
        let stored = self.read_u32(CHECKSUM.start);
        let computed = self.content_hash();
        if stored == computed {
            Ok(())
        } else {
            Err(PageError::ChecksumMismatch { stored, computed })
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("header", &self.header())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes() {
        let page = Page::with_header(PageType::Record, FLAG_RECORD_HEAD);
        assert_eq!(&page.as_bytes()[..2], &[0x02, 0x01]);
        assert_eq!(
            page.header(),
            Ok(PageHeader {
                page_type: PageType::Record,
                flags: FLAG_RECORD_HEAD,
            })
        );
    }

    #[test]
    fn test_zeroed_page_has_no_kind() {
        assert_eq!(Page::new().header(), Err(PageError::UnknownKind(0)));
    }

    #[test]
    fn test_body_fields_are_little_endian() {
        let mut page = Page::new();
        page.write_u64(PageHeader::SIZE, 0x0102_0304_0506_0708);
        assert_eq!(page.read_bytes(PageHeader::SIZE, 2), &[0x08, 0x07]);
        assert_eq!(page.read_u32(PageHeader::SIZE), 0x0506_0708);
    }

    #[test]
    fn test_sealed_page_detects_flipped_bit() {
        let mut page = Page::with_header(PageType::Free, 0);
        page.write_u64(PageHeader::SIZE, 77);
        page.seal();
        assert_eq!(page.verify_checksum(), Ok(()));

        page.as_bytes_mut()[PAGE_SIZE - 1] ^= 0x10;
        assert!(matches!(
            page.verify_checksum(),
            Err(PageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_seal_ignores_previous_checksum() {
        let mut page = Page::with_header(PageType::Record, 0);
        page.write_u32(2, 0xDEAD_BEEF);
        page.seal();
        let first = page.read_u32(2);
        page.seal();
        assert_eq!(page.read_u32(2), first);
    }
}
