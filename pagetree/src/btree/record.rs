//! Persisted tree metadata.
//!
//! # Legacy Layout
//!
//! ```text
//! comparator tag | key codec tag | value codec tag | height (i32) | root (i64)
//! | page capacity (i32) | entry count | [compression provider]
//! ```
//!
//! The entry count is an `i32`. The sentinel `-1` means an exact `i64` count
//! follows. The compression provider is optional: stores written before
//! compression existed end right after the entry count, and that record reads
//! back as "no provider".
//!
//! # Compact Layout
//!
//! ```text
//! height | page capacity | root | entry count       (varints)
//! comparator tag | key codec tag | value codec tag | compression provider
//! ```
//!
//! A root id of `0` means the tree has no root.

use crate::compression::CompressionProvider;
use crate::datum::{Codec, Comparator};
use crate::encoding::{Encoding, FormatError, Reader, Writer};
use crate::storage::RecordId;

/// Entry count sentinel announcing a following 64-bit count.
const LONG_COUNT_SENTINEL: i32 = -1;

/// Metadata of one tree, as stored in its own record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRecord {
    pub comparator: Comparator,
    pub key_codec: Option<Codec>,
    pub value_codec: Option<Codec>,
    pub height: u32,
    pub root: Option<RecordId>,
    pub page_capacity: u32,
    pub entry_count: u64,
    pub compression: Option<CompressionProvider>,
}

impl TreeRecord {
    pub fn encode(&self, encoding: Encoding) -> Result<Vec<u8>, FormatError> {
        let mut out = Writer::new();
        match encoding {
            Encoding::Legacy => {
                self.comparator.write_tagged(&mut out);
                Codec::write_tagged(self.key_codec, &mut out);
                Codec::write_tagged(self.value_codec, &mut out);
                encoding.write_int(&mut out, self.height)?;
                encoding.write_long(&mut out, self.root.unwrap_or(0))?;
                encoding.write_int(&mut out, self.page_capacity)?;
                match i32::try_from(self.entry_count) {
                    Ok(count) => out.write_i32(count),
                    Err(_) => {
                        out.write_i32(LONG_COUNT_SENTINEL);
                        encoding.write_long(&mut out, self.entry_count)?;
                    }
                }
                CompressionProvider::write_tagged(self.compression, &mut out);
            }
            Encoding::Compact => {
                encoding.write_int(&mut out, self.height)?;
                encoding.write_int(&mut out, self.page_capacity)?;
                encoding.write_long(&mut out, self.root.unwrap_or(0))?;
                encoding.write_long(&mut out, self.entry_count)?;
                self.comparator.write_tagged(&mut out);
                Codec::write_tagged(self.key_codec, &mut out);
                Codec::write_tagged(self.value_codec, &mut out);
                CompressionProvider::write_tagged(self.compression, &mut out);
            }
        }
        Ok(out.into_inner())
    }

    pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<Self, FormatError> {
        let mut input = Reader::new(bytes);
        let record = match encoding {
            Encoding::Legacy => {
                let comparator = Comparator::read_tagged(&mut input)?;
                let key_codec = Codec::read_tagged(&mut input)?;
                let value_codec = Codec::read_tagged(&mut input)?;
                let height = encoding.read_int(&mut input)?;
                let root = encoding.read_long(&mut input)?;
                let page_capacity = encoding.read_int(&mut input)?;
                let entry_count = match input.read_i32()? {
                    LONG_COUNT_SENTINEL => encoding.read_long(&mut input)?,
                    count => u64::try_from(count).map_err(|_| FormatError::InvalidLength {
                        what: "entry count",
                        value: i64::from(count),
                    })?,
                };
                let compression = if input.is_exhausted() {
                    tracing::debug!("tree record predates compression; no provider");
                    None
                } else {
                    CompressionProvider::read_tagged(&mut input)?
                };
                Self {
                    comparator,
                    key_codec,
                    value_codec,
                    height,
                    root: non_zero(root),
                    page_capacity,
                    entry_count,
                    compression,
                }
            }
            Encoding::Compact => {
                let height = encoding.read_int(&mut input)?;
                let page_capacity = encoding.read_int(&mut input)?;
                let root = encoding.read_long(&mut input)?;
                let entry_count = encoding.read_long(&mut input)?;
                Self {
                    comparator: Comparator::read_tagged(&mut input)?,
                    key_codec: Codec::read_tagged(&mut input)?,
                    value_codec: Codec::read_tagged(&mut input)?,
                    compression: CompressionProvider::read_tagged(&mut input)?,
                    height,
                    root: non_zero(root),
                    page_capacity,
                    entry_count,
                }
            }
        };

        if !input.is_exhausted() {
            return Err(FormatError::Malformed(format!(
                "{} trailing bytes after tree record",
                input.remaining()
            )));
        }
        record.validate()?;
        Ok(record)
    }

    /// Check the invariants every persisted tree satisfies.
    fn validate(&self) -> Result<(), FormatError> {
        if self.page_capacity < 2 || self.page_capacity % 2 != 0 {
            return Err(FormatError::Malformed(format!(
                "page capacity {} is not an even number of at least 2",
                self.page_capacity
            )));
        }
        let empty = [self.height == 0, self.root.is_none(), self.entry_count == 0];
        if empty.iter().any(|&e| e != empty[0]) {
            return Err(FormatError::Malformed(format!(
                "inconsistent tree: height {}, root {:?}, {} entries",
                self.height, self.root, self.entry_count
            )));
        }
        Ok(())
    }
}

const fn non_zero(id: RecordId) -> Option<RecordId> {
    if id == 0 { None } else { Some(id) }
}
