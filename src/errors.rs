//! Error types for the merger stages.
//!
//! Errors are stage-specific to keep diagnostics precise: header
//! classification, body decompression, and the two structural passes each
//! have their own enum, combined into `MergeError` at the API boundary.
//! All enums are `#[non_exhaustive]` so variants can be added without
//! breaking callers.

use std::fmt;
use std::io;

use crate::header::BodyEncoding;
use crate::varint::VarintError;

/// Errors from document header parsing and body-encoding classification.
///
/// These occur before any output-buffer mutation; a failed classification
/// leaves the merger exactly as it was.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum HeaderError {
    /// Document shorter than the minimal header.
    TooSmall,
    /// First four bytes are not a known Sereal magic.
    BadMagic,
    /// The high-bit magic was found UTF-8 encoded: the document was
    /// corrupted by a round-trip through a text encoding.
    MojibakeMagic,
    /// Magic and protocol version disagree (classic magic carries v1/v2,
    /// high-bit magic carries v3+).
    BadVersion { version: u8 },
    /// The user-header length varint is malformed.
    Varint(VarintError),
    /// The user header runs past the end of the document.
    SuffixOverrun,
    /// Document type nibble names an encoding this merger does not handle.
    UnsupportedDocType(u8),
    /// Body encoding is not valid for the document's protocol version.
    CompressionVersionMismatch {
        encoding: BodyEncoding,
        version: u8,
    },
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall => write!(f, "document too small for a Sereal header"),
            Self::BadMagic => write!(f, "bad Sereal magic"),
            Self::MojibakeMagic => {
                write!(f, "bad Sereal magic: document appears to be UTF-8 encoded")
            }
            Self::BadVersion { version } => {
                write!(f, "protocol version {version} does not match the magic")
            }
            Self::Varint(err) => write!(f, "bad user-header length: {err}"),
            Self::SuffixOverrun => write!(f, "user header runs past end of document"),
            Self::UnsupportedDocType(doctype) => {
                write!(f, "document type {doctype} not supported")
            }
            Self::CompressionVersionMismatch { encoding, version } => {
                write!(f, "{encoding} body not valid for v{version} documents")
            }
        }
    }
}

impl std::error::Error for HeaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Varint(err) => Some(err),
            _ => None,
        }
    }
}

impl From<VarintError> for HeaderError {
    fn from(err: VarintError) -> Self {
        Self::Varint(err)
    }
}

/// Errors from whole-body decompression.
#[derive(Debug)]
#[non_exhaustive]
pub enum DecompressError {
    /// The compressed-size or uncompressed-size varint prefix is malformed.
    BadLengthPrefix(VarintError),
    /// A declared length does not fit in memory on this target.
    LengthOverflow,
    /// The declared compressed frame runs past the end of the body.
    CorruptFrame,
    /// zlib stream produced a different byte count than its prefix declared.
    LengthMismatch { got: usize, expected: usize },
    /// Snappy decode failure.
    Snappy(snap::Error),
    /// zlib decode failure.
    Zlib(io::Error),
}

impl fmt::Display for DecompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLengthPrefix(err) => write!(f, "bad length prefix: {err}"),
            Self::LengthOverflow => write!(f, "declared length too large"),
            Self::CorruptFrame => write!(f, "compressed frame runs past end of body"),
            Self::LengthMismatch { got, expected } => {
                write!(f, "decompressed {got} bytes, expected {expected}")
            }
            Self::Snappy(err) => write!(f, "snappy: {err}"),
            Self::Zlib(err) => write!(f, "zlib: {err}"),
        }
    }
}

impl std::error::Error for DecompressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BadLengthPrefix(err) => Some(err),
            Self::Snappy(err) => Some(err),
            Self::Zlib(err) => Some(err),
            _ => None,
        }
    }
}

impl From<VarintError> for DecompressError {
    fn from(err: VarintError) -> Self {
        Self::BadLengthPrefix(err)
    }
}

impl From<snap::Error> for DecompressError {
    fn from(err: snap::Error) -> Self {
        Self::Snappy(err)
    }
}

/// Structural errors raised by either merge pass.
///
/// Any of these rolls the output buffer back to its pre-append length; the
/// merger stays usable for further inputs.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum BodyError {
    /// A tag declared more bytes than the body holds.
    Truncated,
    /// String length field out of range.
    BadStringLength(u64),
    /// Expected a string-shaped tag (class name or regexp operand).
    BadStringTag(u8),
    /// Array or hash length field out of range.
    BadArrayOrHashLength,
    /// Back-reference names an offset that is absent, unresolved, or not
    /// strictly behind the referencing tag.
    BadBackReference { tag: u8, offset: u64 },
    /// Tag byte outside the known table.
    UnknownTag { tag: u8, offset: usize },
    /// A nested document start inside a body.
    UnexpectedPacketStart,
    /// A varint field does not fit in 64 bits.
    BadVarint,
    /// The body drained with structural scopes still open.
    UnclosedContainers { open: usize },
    /// The pass wrote more than the reserved worst-case budget.
    ReservationViolated,
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated document"),
            Self::BadStringLength(len) => write!(f, "bad string length {len}"),
            Self::BadStringTag(tag) => {
                write!(f, "expected string tag, found 0x{tag:02x}")
            }
            Self::BadArrayOrHashLength => write!(f, "bad array or hash length"),
            Self::BadBackReference { tag, offset } => {
                write!(f, "tag 0x{tag:02x} refers to invalid offset {offset}")
            }
            Self::UnknownTag { tag, offset } => {
                write!(f, "unknown tag 0x{tag:02x} at offset {offset}")
            }
            Self::UnexpectedPacketStart => write!(f, "unexpected start of new document"),
            Self::BadVarint => write!(f, "malformed varint field"),
            Self::UnclosedContainers { open } => {
                write!(f, "document ended with {open} containers open")
            }
            Self::ReservationViolated => {
                write!(f, "merge output exceeded its reserved budget")
            }
        }
    }
}

impl std::error::Error for BodyError {}

impl From<VarintError> for BodyError {
    fn from(err: VarintError) -> Self {
        // A field that runs off the buffer is a truncated document.
        match err {
            VarintError::Truncated => Self::Truncated,
            VarintError::Overflow => Self::BadVarint,
        }
    }
}

/// Errors surfaced by `Merger::append` and `Merger::finish`.
#[derive(Debug)]
#[non_exhaustive]
pub enum MergeError {
    /// Input header parsing or classification failed.
    Header(HeaderError),
    /// Input body decompression failed.
    Decompress(DecompressError),
    /// Structural failure in one of the merge passes.
    Body(BodyError),
    /// The merger was configured for a protocol version newer than this
    /// implementation speaks.
    UnsupportedVersion { requested: u8, max: u8 },
    /// Top-level element kind is declared but not implemented.
    InvalidTopLevel,
    /// `append` after `finish`.
    FinishedDocument,
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(err) => write!(f, "{err}"),
            Self::Decompress(err) => write!(f, "{err}"),
            Self::Body(err) => write!(f, "{err}"),
            Self::UnsupportedVersion { requested, max } => {
                write!(f, "protocol version {requested} not supported (max {max})")
            }
            Self::InvalidTopLevel => write!(f, "invalid top-level element"),
            Self::FinishedDocument => write!(f, "finished document"),
        }
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Header(err) => Some(err),
            Self::Decompress(err) => Some(err),
            Self::Body(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HeaderError> for MergeError {
    fn from(err: HeaderError) -> Self {
        Self::Header(err)
    }
}

impl From<DecompressError> for MergeError {
    fn from(err: DecompressError) -> Self {
        Self::Decompress(err)
    }
}

impl From<BodyError> for MergeError {
    fn from(err: BodyError) -> Self {
        Self::Body(err)
    }
}
