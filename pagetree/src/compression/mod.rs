//! Compression of ordered byte-array sequences.
//!
//! Node keys are serialized as one compression session: every key of a node
//! is fed, in key order, to a [`ByteArrayCompressor`], and read back through
//! the matching [`ByteArrayDecompressor`] in exactly the same order. A session
//! is stateful (it may remember the previous array) and is never reused across
//! nodes.
//!
//! Two strategies exist:
//!
//! - [`CompressionProvider::Identity`]: a 4-byte signed length (`-1` for an
//!   absent group) followed by the raw bytes. This is also the framing used
//!   by stores written before compression existed.
//! - [`CompressionProvider::LeadingValue`]: stores only the suffix that differs
//!   from the previous array. Non-negative lengths keep the identity framing,
//!   so the format stays readable by an identity reader for uncompressed groups.

pub mod identity;
pub mod leading_value;

pub use identity::{IdentityCompressor, IdentityDecompressor};
pub use leading_value::{LeadingValueCompressor, LeadingValueDecompressor};

use crate::encoding::{FormatError, Reader, Writer};

/// Length marker of an absent group.
pub const ABSENT_GROUP: i32 = -1;

/// Writing side of a compression session.
pub trait ByteArrayCompressor {
    /// Consume the next array of the sequence; `None` marks an absent group.
    ///
    /// Output may be buffered until [`finish_compression`](Self::finish_compression).
    fn compress_next_group(&mut self, group: Option<&[u8]>) -> Result<(), FormatError>;

    /// Flush everything buffered so far to the underlying writer.
    fn finish_compression(&mut self) -> Result<(), FormatError>;
}

/// Reading side of a compression session.
pub trait ByteArrayDecompressor {
    /// Next array in write order, or `None` for an absent group.
    fn decompress_next_group(&mut self) -> Result<Option<Vec<u8>>, FormatError>;
}

/// Compression strategy configured on a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionProvider {
    /// Length-prefixed raw arrays.
    Identity,
    /// Shared-prefix elimination against the previous array.
    ///
    /// The first `minimum_ignored_prefix` bytes are always stored raw and
    /// never counted as shared (e.g. a 2-byte string length tag).
    LeadingValue { minimum_ignored_prefix: u8 },
}

impl CompressionProvider {
    /// Leading-value compression for general binary keys.
    pub const BINARY: Self = Self::LeadingValue {
        minimum_ignored_prefix: 0,
    };

    /// Leading-value compression for keys carrying a 2-byte length tag.
    pub const TEXT: Self = Self::LeadingValue {
        minimum_ignored_prefix: 2,
    };

    const TAG_NONE: u8 = 0;
    const TAG_IDENTITY: u8 = 1;
    const TAG_LEADING_VALUE: u8 = 2;

    /// Start a compression session writing into `out`.
    #[must_use]
    pub fn compressor<'w>(self, out: &'w mut Writer) -> Box<dyn ByteArrayCompressor + 'w> {
        match self {
            Self::Identity => Box::new(IdentityCompressor::new(out)),
            Self::LeadingValue {
                minimum_ignored_prefix,
            } => Box::new(LeadingValueCompressor::new(
                out,
                usize::from(minimum_ignored_prefix),
            )),
        }
    }

    /// Start a decompression session reading from `input`.
    #[must_use]
    pub fn decompressor<'r, 'a>(
        self,
        input: &'r mut Reader<'a>,
    ) -> Box<dyn ByteArrayDecompressor + 'r> {
        match self {
            Self::Identity => Box::new(IdentityDecompressor::new(input)),
            Self::LeadingValue {
                minimum_ignored_prefix,
            } => Box::new(LeadingValueDecompressor::new(
                input,
                usize::from(minimum_ignored_prefix),
            )),
        }
    }

    /// Write a nullable provider as a discriminator byte plus parameters.
    pub fn write_tagged(provider: Option<Self>, out: &mut Writer) {
        match provider {
            None => out.write_u8(Self::TAG_NONE),
            Some(Self::Identity) => out.write_u8(Self::TAG_IDENTITY),
            Some(Self::LeadingValue {
                minimum_ignored_prefix,
            }) => {
                out.write_u8(Self::TAG_LEADING_VALUE);
                out.write_u8(minimum_ignored_prefix);
            }
        }
    }

    /// Read a provider written by [`CompressionProvider::write_tagged`].
    pub fn read_tagged(input: &mut Reader<'_>) -> Result<Option<Self>, FormatError> {
        match input.read_u8()? {
            Self::TAG_NONE => Ok(None),
            Self::TAG_IDENTITY => Ok(Some(Self::Identity)),
            Self::TAG_LEADING_VALUE => Ok(Some(Self::LeadingValue {
                minimum_ignored_prefix: input.read_u8()?,
            })),
            tag => Err(FormatError::UnknownTag {
                what: "compression provider",
                tag,
            }),
        }
    }
}

/// Encode `groups` in one session and return the bytes.
pub fn compress_all(
    provider: CompressionProvider,
    groups: &[Option<&[u8]>],
) -> Result<Vec<u8>, FormatError> {
    let mut out = Writer::new();
    {
        let mut compressor = provider.compressor(&mut out);
        for group in groups {
            compressor.compress_next_group(*group)?;
        }
        compressor.finish_compression()?;
    }
    Ok(out.into_inner())
}

/// Decode exactly `count` groups from `bytes` in one session.
pub fn decompress_all(
    provider: CompressionProvider,
    bytes: &[u8],
    count: usize,
) -> Result<Vec<Option<Vec<u8>>>, FormatError> {
    let mut input = Reader::new(bytes);
    let mut decompressor = provider.decompressor(&mut input);
    (0..count)
        .map(|_| decompressor.decompress_next_group())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_tag_roundtrip() {
        for provider in [
            None,
            Some(CompressionProvider::Identity),
            Some(CompressionProvider::BINARY),
            Some(CompressionProvider::TEXT),
        ] {
            let mut out = Writer::new();
            CompressionProvider::write_tagged(provider, &mut out);
            let bytes = out.into_inner();
            let mut input = Reader::new(&bytes);
            assert_eq!(
                CompressionProvider::read_tagged(&mut input).expect("decode"),
                provider
            );
            assert!(input.is_exhausted());
        }
    }

    #[test]
    fn test_unknown_provider_tag() {
        let mut input = Reader::new(&[0x7F]);
        assert_eq!(
            CompressionProvider::read_tagged(&mut input),
            Err(FormatError::UnknownTag {
                what: "compression provider",
                tag: 0x7F
            })
        );
    }

    #[test]
    fn test_identity_reader_accepts_uncompressed_leading_value_groups() {
        // Groups with nothing in common are written with the identity framing.
        let groups: [Option<&[u8]>; 3] = [Some(b"abc"), None, Some(b"xyz")];
        let bytes = compress_all(CompressionProvider::BINARY, &groups).expect("compress");
        let identity = compress_all(CompressionProvider::Identity, &groups).expect("compress");
        assert_eq!(bytes, identity);

        let decoded = decompress_all(CompressionProvider::Identity, &bytes, 3).expect("decode");
        assert_eq!(decoded[0].as_deref(), Some(&b"abc"[..]));
        assert_eq!(decoded[1], None);
        assert_eq!(decoded[2].as_deref(), Some(&b"xyz"[..]));
    }
}
