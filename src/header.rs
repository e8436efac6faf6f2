//! Document header parsing and body-encoding classification.
//!
//! A Sereal document opens with a 4-byte little-endian magic, one combined
//! version/type byte (protocol version in the low nibble, body encoding in
//! the high nibble), and a varint-length user header that the merger skips.
//! Classic magic (`=srl`) carries protocol v1/v2; the high-bit magic
//! (`=\xF3rl`) carries v3 and up.
//!
//! # Invariants
//! - `body_start` always lies within the document (an empty body is legal).
//! - Compressed encodings are version-gated here, before any decompression.

use std::fmt;

use crate::errors::HeaderError;
use crate::varint;

/// Highest protocol version this merger emits.
pub const PROTOCOL_VERSION: u8 = 3;

/// `=srl` as a little-endian u32 (protocol v1/v2).
pub const MAGIC: u32 = 0x6c72_733d;
/// `=\xF3rl` as a little-endian u32 (protocol v3+).
pub const MAGIC_HIGH_BIT: u32 = 0x6c72_f33d;
/// The high-bit magic after an accidental UTF-8 round trip: `0xF3`
/// becomes `0xC3 0xB3` and shifts the rest. Detected only to produce a
/// useful diagnostic.
pub const MAGIC_HIGH_BIT_UTF8: u32 = 0x72b3_c33d;

/// Fixed prefix before the user header: magic + version/type byte.
const MAGIC_AND_VERSION_LEN: usize = 5;

/// Body encoding named by the type nibble of the version byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyEncoding {
    Raw,
    /// Whole-body snappy, the v1 legacy framing.
    Snappy,
    /// Snappy with a varint compressed-length prefix.
    SnappyIncremental,
    /// zlib with a varint uncompressed-length prefix.
    Zlib,
}

impl fmt::Display for BodyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Snappy => write!(f, "snappy"),
            Self::SnappyIncremental => write!(f, "incremental snappy"),
            Self::Zlib => write!(f, "zlib"),
        }
    }
}

const DOCTYPE_RAW: u8 = 0;
const DOCTYPE_SNAPPY: u8 = 1;
const DOCTYPE_SNAPPY_INCREMENTAL: u8 = 2;
const DOCTYPE_ZLIB: u8 = 3;

/// Parsed document header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentHeader {
    /// Protocol version from the low nibble.
    pub version: u8,
    /// Body encoding from the type nibble, version-gated.
    pub encoding: BodyEncoding,
    /// Byte index where the (possibly compressed) body begins.
    pub body_start: usize,
}

/// Parses and validates a document header.
///
/// Skips the user header; the suffix bytes themselves are never inspected.
///
/// # Errors
/// - `HeaderError::TooSmall` / `BadMagic` / `MojibakeMagic` / `BadVersion`
///   on a malformed or mismatched preamble.
/// - `HeaderError::SuffixOverrun` if the user header runs past the input.
/// - `HeaderError::UnsupportedDocType` for type nibbles this merger does
///   not handle (zstd, the reserved values).
/// - `HeaderError::CompressionVersionMismatch` when the encoding is not
///   valid for the document's protocol version (snappy is v1-only in its
///   non-incremental framing, zlib needs v3+).
pub fn read_header(doc: &[u8]) -> Result<DocumentHeader, HeaderError> {
    if doc.len() <= MAGIC_AND_VERSION_LEN {
        return Err(HeaderError::TooSmall);
    }

    let magic = u32::from_le_bytes([doc[0], doc[1], doc[2], doc[3]]);
    let version = doc[4] & 0x0f;
    let doctype = doc[4] >> 4;

    match magic {
        MAGIC if (1..=2).contains(&version) => {}
        MAGIC_HIGH_BIT if version >= 3 => {}
        MAGIC | MAGIC_HIGH_BIT => return Err(HeaderError::BadVersion { version }),
        MAGIC_HIGH_BIT_UTF8 => return Err(HeaderError::MojibakeMagic),
        _ => return Err(HeaderError::BadMagic),
    }

    let (suffix_len, varint_len) = varint::decode(&doc[MAGIC_AND_VERSION_LEN..])?;
    let suffix_len = usize::try_from(suffix_len).map_err(|_| HeaderError::SuffixOverrun)?;
    let body_start = MAGIC_AND_VERSION_LEN
        .checked_add(varint_len)
        .and_then(|n| n.checked_add(suffix_len))
        .ok_or(HeaderError::SuffixOverrun)?;
    if body_start > doc.len() {
        return Err(HeaderError::SuffixOverrun);
    }

    let encoding = match doctype {
        DOCTYPE_RAW => BodyEncoding::Raw,
        DOCTYPE_SNAPPY => {
            if version != 1 {
                return Err(HeaderError::CompressionVersionMismatch {
                    encoding: BodyEncoding::Snappy,
                    version,
                });
            }
            BodyEncoding::Snappy
        }
        DOCTYPE_SNAPPY_INCREMENTAL => BodyEncoding::SnappyIncremental,
        DOCTYPE_ZLIB => {
            if version < 3 {
                return Err(HeaderError::CompressionVersionMismatch {
                    encoding: BodyEncoding::Zlib,
                    version,
                });
            }
            BodyEncoding::Zlib
        }
        other => return Err(HeaderError::UnsupportedDocType(other)),
    };

    Ok(DocumentHeader {
        version,
        encoding,
        body_start,
    })
}
