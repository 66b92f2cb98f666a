//! Unsigned LEB128 varints and ZigZag signed integers.
//!
//! Used by the compact persisted encoding and by the `Packed` codec. Each
//! byte carries 7 payload bits, low group first; the high bit marks a
//! continuation byte. A `u64` needs at most 10 bytes.

use crate::encoding::FormatError;

/// Maximum encoded length of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Append `value` to `out` as an unsigned varint.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_u64(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// Decode an unsigned varint starting at `*offset`, advancing the offset.
pub fn decode_u64(src: &[u8], offset: &mut usize) -> Result<u64, FormatError> {
    let mut result = 0u64;
    let mut shift = 0u32;
    for i in 0..MAX_VARINT_LEN {
        let Some(&byte) = src.get(*offset) else {
            return Err(FormatError::UnexpectedEof {
                needed: 1,
                remaining: 0,
            });
        };
        *offset += 1;
        let payload = u64::from(byte & 0x7f);
        if i == MAX_VARINT_LEN - 1 && payload > 1 {
            return Err(FormatError::VarintOverflow);
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
    Err(FormatError::VarintOverflow)
}

/// Append a ZigZag-encoded signed integer.
#[allow(clippy::cast_sign_loss)]
pub fn encode_i64(value: i64, out: &mut Vec<u8>) {
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    encode_u64(zigzag, out);
}

/// Decode a ZigZag-encoded signed integer.
#[allow(clippy::cast_possible_wrap)]
pub fn decode_i64(src: &[u8], offset: &mut usize) -> Result<i64, FormatError> {
    let zigzag = decode_u64(src, offset)?;
    Ok(((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_lengths() {
        let cases = [
            (0, 1),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (u64::MAX, MAX_VARINT_LEN),
        ];
        for (value, len) in cases {
            let mut buf = Vec::new();
            encode_u64(value, &mut buf);
            assert_eq!(buf.len(), len, "length of {value}");
        }
    }

    #[test]
    fn test_decode_sequence() {
        let mut buf = Vec::new();
        encode_u64(300, &mut buf);
        encode_i64(-5, &mut buf);
        encode_u64(u64::MAX, &mut buf);

        let mut offset = 0;
        assert_eq!(decode_u64(&buf, &mut offset).expect("first"), 300);
        assert_eq!(decode_i64(&buf, &mut offset).expect("second"), -5);
        assert_eq!(decode_u64(&buf, &mut offset).expect("third"), u64::MAX);
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn test_truncated_input() {
        let buf = [0x80u8, 0x80];
        let mut offset = 0;
        assert!(matches!(
            decode_u64(&buf, &mut offset),
            Err(FormatError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_overlong_input() {
        let buf = [0xFFu8; 11];
        let mut offset = 0;
        assert_eq!(
            decode_u64(&buf, &mut offset),
            Err(FormatError::VarintOverflow)
        );
    }
}
