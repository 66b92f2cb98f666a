//! Key and value types, their byte codecs, and key orderings.
//!
//! A tree stores keys and values as bytes. Every storable type implements
//! [`Datum`], and a tree may pick a [`Codec`] for its keys and for its values;
//! an absent codec means the type's [`Codec::Native`] form. Codecs and
//! [`Comparator`]s are closed sets persisted as a discriminator byte, so a
//! tree record never refers to code outside this crate.

use std::cmp::Ordering;

use crate::encoding::{FormatError, Reader, Writer, varint};

/// How a [`Datum`] is turned into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Big-endian fixed-width integers; raw bytes for text and byte strings.
    Native,
    /// LEB128 integers (ZigZag for signed); raw bytes for text and byte strings.
    Packed,
    /// 2-byte big-endian length tag followed by the payload. Text and byte
    /// strings only; pairs with
    /// [`CompressionProvider::TEXT`](crate::compression::CompressionProvider::TEXT).
    LengthTagged,
}

impl Codec {
    const TAG_NONE: u8 = 0;

    const fn tag(self) -> u8 {
        match self {
            Self::Native => 1,
            Self::Packed => 2,
            Self::LengthTagged => 3,
        }
    }

    /// Write a nullable codec as a discriminator byte.
    pub fn write_tagged(codec: Option<Self>, out: &mut Writer) {
        out.write_u8(codec.map_or(Self::TAG_NONE, Self::tag));
    }

    /// Read a codec written by [`Codec::write_tagged`].
    pub fn read_tagged(input: &mut Reader<'_>) -> Result<Option<Self>, FormatError> {
        match input.read_u8()? {
            Self::TAG_NONE => Ok(None),
            1 => Ok(Some(Self::Native)),
            2 => Ok(Some(Self::Packed)),
            3 => Ok(Some(Self::LengthTagged)),
            tag => Err(FormatError::UnknownTag { what: "codec", tag }),
        }
    }
}

/// Total order applied to a tree's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Comparator {
    /// The key type's own [`Ord`].
    #[default]
    Natural,
    /// The reverse of the key type's [`Ord`].
    Reverse,
}

impl Comparator {
    #[must_use]
    pub fn compare<K: Ord>(self, a: &K, b: &K) -> Ordering {
        match self {
            Self::Natural => a.cmp(b),
            Self::Reverse => b.cmp(a),
        }
    }

    pub fn write_tagged(self, out: &mut Writer) {
        out.write_u8(match self {
            Self::Natural => 1,
            Self::Reverse => 2,
        });
    }

    pub fn read_tagged(input: &mut Reader<'_>) -> Result<Self, FormatError> {
        match input.read_u8()? {
            1 => Ok(Self::Natural),
            2 => Ok(Self::Reverse),
            tag => Err(FormatError::UnknownTag {
                what: "comparator",
                tag,
            }),
        }
    }
}

/// A type that can be stored as a tree key or value.
pub trait Datum: Clone + Send + Sync + 'static {
    /// Whether `codec` can represent this type.
    fn supports(codec: Codec) -> bool;

    /// Append the encoded form of `self`.
    fn encode(&self, codec: Codec, out: &mut Vec<u8>) -> Result<(), FormatError>;

    /// Decode a value from exactly `bytes`.
    fn decode(bytes: &[u8], codec: Codec) -> Result<Self, FormatError>;
}

fn unsupported(codec: Codec, type_name: &str) -> FormatError {
    FormatError::Malformed(format!("codec {codec:?} cannot encode {type_name}"))
}

fn encode_raw(bytes: &[u8], codec: Codec, out: &mut Vec<u8>) -> Result<(), FormatError> {
    if codec == Codec::LengthTagged {
        let len = u16::try_from(bytes.len()).map_err(|_| FormatError::TooLong {
            what: "length-tagged payload",
            len: bytes.len(),
            max: u16::MAX as usize,
        })?;
        out.extend_from_slice(&len.to_be_bytes());
    }
    out.extend_from_slice(bytes);
    Ok(())
}

fn decode_raw(bytes: &[u8], codec: Codec) -> Result<&[u8], FormatError> {
    if codec != Codec::LengthTagged {
        return Ok(bytes);
    }
    let mut input = Reader::new(bytes);
    let tag = input.read_bytes(2)?;
    let len = usize::from(u16::from_be_bytes([tag[0], tag[1]]));
    if len != input.remaining() {
        return Err(FormatError::InvalidLength {
            what: "length tag",
            value: i64::from(u16::from_be_bytes([tag[0], tag[1]])),
        });
    }
    input.read_bytes(len)
}

impl Datum for Vec<u8> {
    fn supports(_codec: Codec) -> bool {
        true
    }

    fn encode(&self, codec: Codec, out: &mut Vec<u8>) -> Result<(), FormatError> {
        encode_raw(self, codec, out)
    }

    fn decode(bytes: &[u8], codec: Codec) -> Result<Self, FormatError> {
        Ok(decode_raw(bytes, codec)?.to_vec())
    }
}

impl Datum for String {
    fn supports(_codec: Codec) -> bool {
        true
    }

    fn encode(&self, codec: Codec, out: &mut Vec<u8>) -> Result<(), FormatError> {
        encode_raw(self.as_bytes(), codec, out)
    }

    fn decode(bytes: &[u8], codec: Codec) -> Result<Self, FormatError> {
        let raw = decode_raw(bytes, codec)?;
        Self::from_utf8(raw.to_vec())
            .map_err(|e| FormatError::Malformed(format!("string key is not UTF-8: {e}")))
    }
}

/// Decode a single varint that must span all of `bytes`.
fn decode_whole_varint(bytes: &[u8]) -> Result<u64, FormatError> {
    let mut offset = 0;
    let value = varint::decode_u64(bytes, &mut offset)?;
    if offset != bytes.len() {
        return Err(FormatError::Malformed(format!(
            "{} trailing bytes after packed integer",
            bytes.len() - offset
        )));
    }
    Ok(value)
}

macro_rules! unsigned_datum {
    ($ty:ty) => {
        impl Datum for $ty {
            fn supports(codec: Codec) -> bool {
                codec != Codec::LengthTagged
            }

            fn encode(&self, codec: Codec, out: &mut Vec<u8>) -> Result<(), FormatError> {
                match codec {
                    Codec::Native => out.extend_from_slice(&self.to_be_bytes()),
                    Codec::Packed => varint::encode_u64(u64::from(*self), out),
                    Codec::LengthTagged => return Err(unsupported(codec, stringify!($ty))),
                }
                Ok(())
            }

            fn decode(bytes: &[u8], codec: Codec) -> Result<Self, FormatError> {
                match codec {
                    Codec::Native => {
                        let array = bytes.try_into().map_err(|_| FormatError::InvalidLength {
                            what: concat!(stringify!($ty), " width"),
                            value: i64::try_from(bytes.len()).unwrap_or(i64::MAX),
                        })?;
                        Ok(<$ty>::from_be_bytes(array))
                    }
                    Codec::Packed => {
                        let value = decode_whole_varint(bytes)?;
                        <$ty>::try_from(value).map_err(|_| {
                            FormatError::Malformed(format!(
                                "packed value {value} overflows {}",
                                stringify!($ty)
                            ))
                        })
                    }
                    Codec::LengthTagged => Err(unsupported(codec, stringify!($ty))),
                }
            }
        }
    };
}

macro_rules! signed_datum {
    ($ty:ty) => {
        impl Datum for $ty {
            fn supports(codec: Codec) -> bool {
                codec != Codec::LengthTagged
            }

            fn encode(&self, codec: Codec, out: &mut Vec<u8>) -> Result<(), FormatError> {
                match codec {
                    Codec::Native => out.extend_from_slice(&self.to_be_bytes()),
                    Codec::Packed => varint::encode_i64(i64::from(*self), out),
                    Codec::LengthTagged => return Err(unsupported(codec, stringify!($ty))),
                }
                Ok(())
            }

            fn decode(bytes: &[u8], codec: Codec) -> Result<Self, FormatError> {
                match codec {
                    Codec::Native => {
                        let array = bytes.try_into().map_err(|_| FormatError::InvalidLength {
                            what: concat!(stringify!($ty), " width"),
                            value: i64::try_from(bytes.len()).unwrap_or(i64::MAX),
                        })?;
                        Ok(<$ty>::from_be_bytes(array))
                    }
                    Codec::Packed => {
                        let mut offset = 0;
                        let value = varint::decode_i64(bytes, &mut offset)?;
                        if offset != bytes.len() {
                            return Err(FormatError::Malformed(
                                "trailing bytes after packed integer".to_string(),
                            ));
                        }
                        <$ty>::try_from(value).map_err(|_| {
                            FormatError::Malformed(format!(
                                "packed value {value} overflows {}",
                                stringify!($ty)
                            ))
                        })
                    }
                    Codec::LengthTagged => Err(unsupported(codec, stringify!($ty))),
                }
            }
        }
    };
}

unsigned_datum!(u32);
unsigned_datum!(u64);
signed_datum!(i32);
signed_datum!(i64);

/// Encode `datum` with `codec`, defaulting to [`Codec::Native`].
pub(crate) fn encode_datum<T: Datum>(
    datum: &T,
    codec: Option<Codec>,
) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::new();
    datum.encode(codec.unwrap_or(Codec::Native), &mut out)?;
    Ok(out)
}

/// Decode bytes produced by [`encode_datum`].
pub(crate) fn decode_datum<T: Datum>(bytes: &[u8], codec: Option<Codec>) -> Result<T, FormatError> {
    T::decode(bytes, codec.unwrap_or(Codec::Native))
}
