//! Identity strategy: length-prefixed raw arrays, no cross-group state.

use crate::compression::{ABSENT_GROUP, ByteArrayCompressor, ByteArrayDecompressor};
use crate::encoding::{FormatError, Reader, Writer};

/// Write one group with identity framing.
pub(crate) fn write_group(out: &mut Writer, group: Option<&[u8]>) -> Result<(), FormatError> {
    match group {
        None => out.write_i32(ABSENT_GROUP),
        Some(bytes) => {
            let len = i32::try_from(bytes.len()).map_err(|_| FormatError::TooLong {
                what: "byte array",
                len: bytes.len(),
                max: i32::MAX as usize,
            })?;
            out.write_i32(len);
            out.write_bytes(bytes);
        }
    }
    Ok(())
}

/// Read one group with identity framing.
pub(crate) fn read_group(input: &mut Reader<'_>) -> Result<Option<Vec<u8>>, FormatError> {
    let len = input.read_i32()?;
    if len == ABSENT_GROUP {
        return Ok(None);
    }
    let len = usize::try_from(len).map_err(|_| FormatError::InvalidLength {
        what: "byte array length",
        value: i64::from(len),
    })?;
    Ok(Some(input.read_bytes(len)?.to_vec()))
}

/// Writes each group as `i32` length plus raw bytes.
pub struct IdentityCompressor<'w> {
    out: &'w mut Writer,
}

impl<'w> IdentityCompressor<'w> {
    pub const fn new(out: &'w mut Writer) -> Self {
        Self { out }
    }
}

impl ByteArrayCompressor for IdentityCompressor<'_> {
    fn compress_next_group(&mut self, group: Option<&[u8]>) -> Result<(), FormatError> {
        write_group(self.out, group)
    }

    fn finish_compression(&mut self) -> Result<(), FormatError> {
        Ok(())
    }
}

/// Reads groups written by [`IdentityCompressor`].
pub struct IdentityDecompressor<'r, 'a> {
    input: &'r mut Reader<'a>,
}

impl<'r, 'a> IdentityDecompressor<'r, 'a> {
    pub const fn new(input: &'r mut Reader<'a>) -> Self {
        Self { input }
    }
}

impl ByteArrayDecompressor for IdentityDecompressor<'_, '_> {
    fn decompress_next_group(&mut self) -> Result<Option<Vec<u8>>, FormatError> {
        read_group(self.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_layout() {
        let mut out = Writer::new();
        {
            let mut compressor = IdentityCompressor::new(&mut out);
            compressor
                .compress_next_group(Some(b"hi"))
                .expect("compress");
            compressor.compress_next_group(None).expect("compress");
            compressor.compress_next_group(Some(b"")).expect("compress");
            compressor.finish_compression().expect("finish");
        }

        assert_eq!(
            out.as_slice(),
            &[0, 0, 0, 2, b'h', b'i', 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let mut input = Reader::new(&[0xFF, 0xFF, 0xFF, 0xFE]);
        let mut decompressor = IdentityDecompressor::new(&mut input);
        assert!(matches!(
            decompressor.decompress_next_group(),
            Err(FormatError::InvalidLength { value: -2, .. })
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let mut input = Reader::new(&[0, 0, 0, 5, 1, 2]);
        let mut decompressor = IdentityDecompressor::new(&mut input);
        let err = decompressor
            .decompress_next_group()
            .expect_err("payload is short");
        assert!(matches!(err, FormatError::UnexpectedEof { .. }));
    }
}
