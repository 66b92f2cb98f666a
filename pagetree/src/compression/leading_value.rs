//! Leading-value (shared prefix) strategy.
//!
//! Each group is compared against the previous non-absent group of the same
//! session. When more than [`MIN_SHARED_PREFIX`] leading bytes match, the
//! group is written compressed:
//!
//! ```text
//! +------------------+-------------------+----------------------+-------------------+
//! | -length (i32 BE) | shared len (i16)  | ignored prefix (raw) | suffix (raw)      |
//! +------------------+-------------------+----------------------+-------------------+
//! ```
//!
//! Otherwise it is written uncompressed as `+length` followed by all bytes,
//! which is exactly the identity framing. An absent group is written as `-1`
//! and resets the previous group, so the next group can never share a prefix
//! with anything written before the gap.
//!
//! The first `minimum_ignored_prefix` bytes are never counted as shared: they
//! are always stored raw, even when identical to the previous group.

use crate::compression::{ABSENT_GROUP, ByteArrayCompressor, ByteArrayDecompressor, identity};
use crate::encoding::{FormatError, Reader, Writer};

/// A group is compressed only when strictly more bytes than this are shared.
pub const MIN_SHARED_PREFIX: usize = 2;

/// Longest shared prefix the 16-bit field can describe.
pub const MAX_SHARED_PREFIX: usize = i16::MAX as usize;

/// Length of the prefix `current` shares with `previous`, counting from
/// `ignored`. Returns 0 when either array is shorter than `ignored`.
fn shared_prefix_len(previous: &[u8], current: &[u8], ignored: usize) -> usize {
    let max_common = previous.len().min(current.len()).min(MAX_SHARED_PREFIX);
    if max_common < ignored {
        return 0;
    }
    ignored
        + previous[ignored..max_common]
            .iter()
            .zip(&current[ignored..max_common])
            .take_while(|(a, b)| a == b)
            .count()
}

/// Compressor half of a leading-value session.
///
/// Output is buffered until [`finish_compression`](ByteArrayCompressor::finish_compression).
pub struct LeadingValueCompressor<'w> {
    out: &'w mut Writer,
    pending: Writer,
    previous: Option<Vec<u8>>,
    ignored: usize,
}

impl<'w> LeadingValueCompressor<'w> {
    #[must_use]
    pub const fn new(out: &'w mut Writer, minimum_ignored_prefix: usize) -> Self {
        Self {
            out,
            pending: Writer::new(),
            previous: None,
            ignored: minimum_ignored_prefix,
        }
    }
}

impl ByteArrayCompressor for LeadingValueCompressor<'_> {
    fn compress_next_group(&mut self, group: Option<&[u8]>) -> Result<(), FormatError> {
        let Some(current) = group else {
            self.pending.write_i32(ABSENT_GROUP);
            self.previous = None;
            return Ok(());
        };

        let common = self
            .previous
            .as_deref()
            .map_or(0, |previous| shared_prefix_len(previous, current, self.ignored));

        if common > MIN_SHARED_PREFIX {
            let len = i32::try_from(current.len()).map_err(|_| FormatError::TooLong {
                what: "byte array",
                len: current.len(),
                max: i32::MAX as usize,
            })?;
            // common <= MAX_SHARED_PREFIX, so the cast is lossless.
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let common_field = common as i16;
            self.pending.write_i32(-len);
            self.pending.write_i16(common_field);
            self.pending.write_bytes(&current[..self.ignored]);
            self.pending.write_bytes(&current[common..]);
        } else {
            identity::write_group(&mut self.pending, Some(current))?;
        }

        self.previous = Some(current.to_vec());
        Ok(())
    }

    fn finish_compression(&mut self) -> Result<(), FormatError> {
        self.out.write_bytes(self.pending.as_slice());
        self.pending = Writer::new();
        Ok(())
    }
}

/// Decompressor half of a leading-value session.
pub struct LeadingValueDecompressor<'r, 'a> {
    input: &'r mut Reader<'a>,
    previous: Option<Vec<u8>>,
    ignored: usize,
}

impl<'r, 'a> LeadingValueDecompressor<'r, 'a> {
    #[must_use]
    pub const fn new(input: &'r mut Reader<'a>, minimum_ignored_prefix: usize) -> Self {
        Self {
            input,
            previous: None,
            ignored: minimum_ignored_prefix,
        }
    }

    fn read_compressed(&mut self, len: usize) -> Result<Vec<u8>, FormatError> {
        let common_field = self.input.read_i16()?;
        let common = usize::try_from(common_field).map_err(|_| FormatError::InvalidLength {
            what: "shared prefix length",
            value: i64::from(common_field),
        })?;
        if common < self.ignored || common > len {
            return Err(FormatError::Malformed(format!(
                "shared prefix of {common} bytes in a {len}-byte group"
            )));
        }
        let previous = self
            .previous
            .as_deref()
            .filter(|previous| previous.len() >= common)
            .ok_or_else(|| {
                FormatError::Malformed(format!(
                    "group shares {common} bytes with a previous group that does not have them"
                ))
            })?;

        let mut group = Vec::with_capacity(len);
        group.extend_from_slice(self.input.read_bytes(self.ignored)?);
        group.extend_from_slice(&previous[self.ignored..common]);
        group.extend_from_slice(self.input.read_bytes(len - common)?);
        Ok(group)
    }
}

impl ByteArrayDecompressor for LeadingValueDecompressor<'_, '_> {
    fn decompress_next_group(&mut self) -> Result<Option<Vec<u8>>, FormatError> {
        let marker = self.input.read_i32()?;
        if marker == ABSENT_GROUP {
            self.previous = None;
            return Ok(None);
        }

        let group = if marker < 0 {
            self.read_compressed(marker.unsigned_abs() as usize)?
        } else {
            // marker >= 0 here.
            #[allow(clippy::cast_sign_loss)]
            let len = marker as usize;
            self.input.read_bytes(len)?.to_vec()
        };

        self.previous = Some(group.clone());
        Ok(Some(group))
    }
}
