//! Whole-body decompression dispatch.
//!
//! The track-table pass needs random access over the raw body, so
//! compressed bodies are fully decompressed into an owned buffer before any
//! scanning begins; streaming is deliberately not attempted.
//!
//! Frame layouts:
//! - snappy (v1 legacy): the entire remaining body is one snappy block.
//! - incremental snappy: varint compressed length, then that many snappy
//!   bytes. Trailing bytes beyond the frame are ignored.
//! - zlib: varint uncompressed length, then a zlib stream that must inflate
//!   to exactly that many bytes.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::errors::DecompressError;
use crate::header::BodyEncoding;
use crate::varint;

/// Produces the raw document body for `encoding`.
///
/// Raw bodies are borrowed; compressed bodies come back owned.
///
/// # Errors
/// - `DecompressError::BadLengthPrefix` / `CorruptFrame` / `LengthOverflow`
///   on malformed framing.
/// - `DecompressError::Snappy` / `Zlib` on codec failure.
/// - `DecompressError::LengthMismatch` when a zlib stream disagrees with
///   its declared uncompressed size.
pub fn decompress_body(encoding: BodyEncoding, body: &[u8]) -> Result<Cow<'_, [u8]>, DecompressError> {
    match encoding {
        BodyEncoding::Raw => Ok(Cow::Borrowed(body)),
        BodyEncoding::Snappy => Ok(Cow::Owned(snappy_block(body)?)),
        BodyEncoding::SnappyIncremental => {
            let (frame_len, prefix) = varint::decode(body)?;
            let frame_len =
                usize::try_from(frame_len).map_err(|_| DecompressError::LengthOverflow)?;
            let end = prefix
                .checked_add(frame_len)
                .ok_or(DecompressError::CorruptFrame)?;
            if end > body.len() {
                return Err(DecompressError::CorruptFrame);
            }
            Ok(Cow::Owned(snappy_block(&body[prefix..end])?))
        }
        BodyEncoding::Zlib => Ok(Cow::Owned(zlib_block(body)?)),
    }
}

fn snappy_block(frame: &[u8]) -> Result<Vec<u8>, DecompressError> {
    let mut decoder = snap::raw::Decoder::new();
    Ok(decoder.decompress_vec(frame)?)
}

fn zlib_block(body: &[u8]) -> Result<Vec<u8>, DecompressError> {
    let (expected, prefix) = varint::decode(body)?;
    let expected = usize::try_from(expected).map_err(|_| DecompressError::LengthOverflow)?;

    let mut out = Vec::with_capacity(expected);
    let decoder = ZlibDecoder::new(&body[prefix..]);
    // One extra byte of allowance so an over-long stream shows up as a
    // mismatch instead of silent truncation.
    decoder
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(DecompressError::Zlib)?;

    if out.len() != expected {
        return Err(DecompressError::LengthMismatch {
            got: out.len(),
            expected,
        });
    }
    Ok(out)
}
