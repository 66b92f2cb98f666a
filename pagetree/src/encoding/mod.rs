//! Byte-level encoding shared by every persisted record.
//!
//! A store uses exactly one [`Encoding`] for all of its records, chosen when
//! the store is created:
//!
//! - [`Encoding::Legacy`]: fixed-width big-endian integers in a fixed field
//!   order. Readable by stores written before the compact format existed.
//! - [`Encoding::Compact`]: LEB128 varints for integer fields.
//!
//! Independent of the encoding, multi-byte integers written through
//! [`Writer`] are big-endian, matching the compression codecs' framing.

pub mod varint;

use std::fmt;
use std::str::FromStr;

/// Errors raised while decoding persisted bytes.
///
/// These signal a data-format mismatch, never an I/O problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// Input ended before a field was complete.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    /// A discriminator byte did not name a known variant.
    #[error("unknown {what} discriminator: 0x{tag:02x}")]
    UnknownTag { what: &'static str, tag: u8 },
    /// A varint ran past 64 bits.
    #[error("varint exceeds 64 bits")]
    VarintOverflow,
    /// A length or count field held an impossible value.
    #[error("invalid {what}: {value}")]
    InvalidLength { what: &'static str, value: i64 },
    /// A value is too large for the field that must hold it.
    #[error("{what} of {len} exceeds the encodable maximum of {max}")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },
    /// Structurally invalid content.
    #[error("malformed {0}")]
    Malformed(String),
}

/// Persisted encoding strategy of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Fixed-width big-endian fields.
    Legacy,
    /// Variable-length integer fields.
    #[default]
    Compact,
}

impl Encoding {
    /// Discriminator byte stored in a store's superblock.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Legacy => 1,
            Self::Compact => 2,
        }
    }

    /// Decode a discriminator written by [`Encoding::tag`].
    pub fn from_tag(tag: u8) -> Result<Self, FormatError> {
        match tag {
            1 => Ok(Self::Legacy),
            2 => Ok(Self::Compact),
            _ => Err(FormatError::UnknownTag {
                what: "encoding",
                tag,
            }),
        }
    }

    /// Write a small non-negative integer (heights, counts, capacities).
    pub fn write_int(self, out: &mut Writer, value: u32) -> Result<(), FormatError> {
        match self {
            Self::Legacy => {
                let value = i32::try_from(value).map_err(|_| FormatError::TooLong {
                    what: "integer field",
                    len: value as usize,
                    max: i32::MAX as usize,
                })?;
                out.write_i32(value);
            }
            Self::Compact => out.write_varint(u64::from(value)),
        }
        Ok(())
    }

    /// Read an integer written by [`Encoding::write_int`].
    pub fn read_int(self, input: &mut Reader<'_>) -> Result<u32, FormatError> {
        match self {
            Self::Legacy => {
                let value = input.read_i32()?;
                u32::try_from(value).map_err(|_| FormatError::InvalidLength {
                    what: "integer field",
                    value: i64::from(value),
                })
            }
            Self::Compact => {
                let value = input.read_varint()?;
                u32::try_from(value).map_err(|_| {
                    FormatError::Malformed(format!("integer field {value} exceeds 32 bits"))
                })
            }
        }
    }

    /// Write a record id or other 64-bit non-negative quantity.
    pub fn write_long(self, out: &mut Writer, value: u64) -> Result<(), FormatError> {
        match self {
            Self::Legacy => {
                let value = i64::try_from(value).map_err(|_| {
                    FormatError::Malformed(format!("long field {value} exceeds 63 bits"))
                })?;
                out.write_i64(value);
            }
            Self::Compact => out.write_varint(value),
        }
        Ok(())
    }

    /// Read a value written by [`Encoding::write_long`].
    pub fn read_long(self, input: &mut Reader<'_>) -> Result<u64, FormatError> {
        match self {
            Self::Legacy => {
                let value = input.read_i64()?;
                u64::try_from(value).map_err(|_| FormatError::InvalidLength {
                    what: "long field",
                    value,
                })
            }
            Self::Compact => input.read_varint(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Compact => write!(f, "compact"),
        }
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "compact" => Ok(Self::Compact),
            other => Err(format!("expected 'legacy' or 'compact', got '{other}'")),
        }
    }
}

/// Append-only output buffer.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, returning its bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_varint(&mut self, value: u64) {
        varint::encode_u64(value, &mut self.buf);
    }
}

/// Cursor over an input slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Consume exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        if len > self.remaining() {
            return Err(FormatError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i16(&mut self) -> Result<i16, FormatError> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, FormatError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, FormatError> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    pub fn read_varint(&mut self) -> Result<u64, FormatError> {
        varint::decode_u64(self.buf, &mut self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_fields_are_big_endian() {
        let mut out = Writer::new();
        out.write_i16(-2);
        out.write_i32(0x0102_0304);
        out.write_i64(-1);
        assert_eq!(&out.as_slice()[..2], &[0xFF, 0xFE]);
        assert_eq!(&out.as_slice()[2..6], &[1, 2, 3, 4]);

        let bytes = out.into_inner();
        let mut input = Reader::new(&bytes);
        assert_eq!(input.read_i16().expect("i16"), -2);
        assert_eq!(input.read_i32().expect("i32"), 0x0102_0304);
        assert_eq!(input.read_i64().expect("i64"), -1);
        assert!(input.is_exhausted());
    }

    #[test]
    fn test_reader_reports_eof() {
        let mut input = Reader::new(&[1, 2]);
        let err = input.read_i32().expect_err("too short");
        assert_eq!(
            err,
            FormatError::UnexpectedEof {
                needed: 4,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_int_fields_per_encoding() {
        for encoding in [Encoding::Legacy, Encoding::Compact] {
            let mut out = Writer::new();
            encoding.write_int(&mut out, 16).expect("int");
            encoding.write_long(&mut out, 1 << 40).expect("long");
            let bytes = out.into_inner();

            let mut input = Reader::new(&bytes);
            assert_eq!(encoding.read_int(&mut input).expect("int"), 16);
            assert_eq!(encoding.read_long(&mut input).expect("long"), 1 << 40);
            assert!(input.is_exhausted());
        }
    }

    #[test]
    fn test_legacy_rejects_negative_fields() {
        let mut out = Writer::new();
        out.write_i32(-7);
        let bytes = out.into_inner();
        let result = Encoding::Legacy.read_int(&mut Reader::new(&bytes));
        assert!(matches!(result, Err(FormatError::InvalidLength { .. })));
    }

    #[test]
    fn test_encoding_tag_and_parse() {
        assert_eq!(
            Encoding::from_tag(Encoding::Legacy.tag()),
            Ok(Encoding::Legacy)
        );
        assert!(Encoding::from_tag(9).is_err());
        assert_eq!("Compact".parse::<Encoding>(), Ok(Encoding::Compact));
        assert!("zip".parse::<Encoding>().is_err());
    }
}
