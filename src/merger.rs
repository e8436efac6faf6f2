//! The merger state machine and the body-merge second pass.
//!
//! A `Merger` owns one output document. The header is written lazily on
//! first use; each `append` parses one input document, decompresses its
//! body if needed, runs the track-table pass, then copies the body
//! tag-by-tag while remapping back-reference offsets into the output
//! coordinate system and deduplicating string literals and class names
//! against merger-wide tables. `finish` overwrites the reserved length
//! slot with the accumulated element count.
//!
//! # Invariants
//! - The output buffer is append-only between `init` and `finish`; the only
//!   in-place writes are the `ALIAS` track-flag set and the final length
//!   slot overwrite.
//! - A failed `append` truncates the buffer back to its pre-append length;
//!   the string and object tables are additive and keep their entries.
//! - Every offset emitted after a back-reference tag resolves to an
//!   earlier output position carrying the referent's tag.

use ahash::AHashMap;

use crate::decompress::decompress_body;
use crate::errors::{BodyError, MergeError};
use crate::header::{read_header, MAGIC, MAGIC_HIGH_BIT, PROTOCOL_VERSION};
use crate::tags;
use crate::track::TrackTable;
use crate::varint;

/// PAD bytes reserved for the top-level element count varint.
const RESERVED_LENGTH_BYTES: usize = 8;

/// Kind of top-level container the merger emits.
///
/// `Hash` and `HashRef` are declared for completeness; initializing a
/// merger with either fails with `MergeError::InvalidTopLevel`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TopLevelElement {
    Array,
    #[default]
    ArrayRef,
    Hash,
    HashRef,
}

/// Merges independently-serialized Sereal documents into one document.
///
/// ```
/// use sereal_merge::Merger;
///
/// let mut merger = Merger::new();
/// // merger.append(&doc_a)?;
/// // merger.append(&doc_b)?;
/// let merged = merger.finish().unwrap();
/// assert!(!merged.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct Merger {
    /// Requested protocol version; `None` means latest, resolved at init.
    version: Option<u8>,
    /// Top-level elements appended so far.
    count: u64,
    /// Output index of the reserved length slot.
    len_offset: usize,
    /// 1-based offset anchor: index of the empty user-header byte.
    body_offset: usize,
    inited: bool,
    finished: bool,
    /// String payload bytes to the output offset of the first literal.
    str_table: AHashMap<Vec<u8>, usize>,
    /// Class-name bytes to the output offset of the class-name string tag.
    obj_table: AHashMap<Vec<u8>, usize>,
    buf: Vec<u8>,

    /// Kind of top-level container to emit. Takes effect on first
    /// `append`/`finish`; changes after that are ignored.
    pub top_level: TopLevelElement,
}

impl Merger {
    /// Merger for the latest supported protocol version, emitting a
    /// top-level array reference.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merger pinned to protocol version 2.
    #[must_use]
    pub fn new_v2() -> Self {
        Self::with_version(2)
    }

    /// Merger pinned to protocol version 3.
    #[must_use]
    pub fn new_v3() -> Self {
        Self::with_version(3)
    }

    /// Merger for an explicit protocol version.
    ///
    /// The version is validated lazily: the first `append` or `finish`
    /// fails with `MergeError::UnsupportedVersion` if it exceeds
    /// [`PROTOCOL_VERSION`]. Zero means "latest".
    #[must_use]
    pub fn with_version(version: u8) -> Self {
        Self {
            version: (version != 0).then_some(version),
            ..Self::default()
        }
    }

    /// Number of top-level elements appended so far.
    #[inline]
    #[must_use]
    pub fn element_count(&self) -> u64 {
        self.count
    }

    /// Writes the document preamble once: magic, version byte, empty user
    /// header, top-level container tag, reserved length slot.
    fn init(&mut self) -> Result<(), MergeError> {
        if self.inited {
            return Ok(());
        }

        let version = self.version.unwrap_or(PROTOCOL_VERSION);
        if version > PROTOCOL_VERSION {
            return Err(MergeError::UnsupportedVersion {
                requested: version,
                max: PROTOCOL_VERSION,
            });
        }

        self.buf.clear();
        let magic = if version < 3 { MAGIC } else { MAGIC_HIGH_BIT };
        self.buf.extend_from_slice(&magic.to_le_bytes());
        self.buf.push(version);
        self.buf.push(0); // empty user header
        self.body_offset = self.buf.len() - 1;

        match self.top_level {
            TopLevelElement::Array => self.buf.push(tags::ARRAY),
            TopLevelElement::ArrayRef => {
                self.buf.push(tags::REFN);
                self.buf.push(tags::ARRAY);
            }
            _ => return Err(MergeError::InvalidTopLevel),
        }

        self.len_offset = self.buf.len();
        self.buf
            .extend_from_slice(&[tags::PAD; RESERVED_LENGTH_BYTES]);

        self.inited = true;
        Ok(())
    }

    /// Appends one complete Sereal document.
    ///
    /// The input's top-level elements join the merger's top-level
    /// container; its back-references are remapped and its strings and
    /// class names dedup against everything appended so far.
    ///
    /// # Errors
    /// Classification errors leave the merger untouched; structural errors
    /// roll the output buffer back to its pre-append length. Either way
    /// the merger stays usable for further inputs.
    pub fn append(&mut self, doc: &[u8]) -> Result<(), MergeError> {
        self.init()?;
        if self.finished {
            return Err(MergeError::FinishedDocument);
        }

        let header = read_header(doc)?;
        let body = decompress_body(header.encoding, &doc[header.body_start..])?;

        let rollback_len = self.buf.len();
        let mut track = TrackTable::build(&body)?;

        // Worst case is a pure copy with no dedup; reserve it up front so
        // the hot loop never reallocates.
        self.buf.reserve(body.len());

        match self.merge_body(&body, &mut track) {
            Ok(added) => {
                self.count += added;
                Ok(())
            }
            Err(err) => {
                self.buf.truncate(rollback_len);
                Err(err.into())
            }
        }
    }

    /// Finalizes and returns the merged document.
    ///
    /// Writes the element count over the reserved slot; unused reserved
    /// bytes stay `PAD`, which decoders skip. Idempotent: repeated calls
    /// return the same bytes. Valid without any prior `append` (yields an
    /// empty top-level container).
    pub fn finish(&mut self) -> Result<&[u8], MergeError> {
        self.init()?;
        if !self.finished {
            debug_assert!(varint::encoded_len(self.count) <= RESERVED_LENGTH_BYTES);
            let slot = &mut self.buf[self.len_offset..self.len_offset + RESERVED_LENGTH_BYTES];
            varint::write_into(slot, self.count);
            self.finished = true;
        }
        Ok(&self.buf)
    }

    /// Second pass: copies `body` into the output buffer tag-by-tag.
    ///
    /// Returns the number of elements contributed to the top-level
    /// container. On error the caller truncates the buffer.
    fn merge_body(&mut self, body: &[u8], track: &mut TrackTable) -> Result<u64, BodyError> {
        let reserve_limit = self.buf.len() + body.len();
        let mut didx = 0usize;

        // The stack counts declared-but-unconsumed children per open scope.
        // The -1 sentinel measures the top-level contribution: after the
        // body drains it holds -(1 + elements appended).
        let mut stack: Vec<i64> = Vec::with_capacity(16);
        stack.push(-1);

        while didx < body.len() {
            let raw = body[didx];
            let tag = raw & !tags::TRACK_FLAG;

            let doc_rel = didx + 1;
            let mut out_rel = self.buf.len() - self.body_offset;
            let trackme = track.next_pending() == Some(doc_rel);

            let mut level = stack.len() - 1;
            while stack[level] == 0 {
                stack.pop();
                level -= 1;
            }

            match tag {
                // Atoms: small integers and the one-byte scalars.
                t if t < tags::VARINT => {
                    self.buf.push(raw);
                    didx += 1;
                }
                tags::UNDEF
                | tags::CANONICAL_UNDEF
                | tags::TRUE
                | tags::FALSE
                | tags::SHORT_BINARY_0 => {
                    self.buf.push(raw);
                    didx += 1;
                }

                // Pass-through tags consume no structural slot of their
                // own; pre-increment to cancel the generic decrement.
                tags::PAD | tags::REFN | tags::WEAKEN | tags::EXTEND => {
                    stack[level] += 1;
                    self.buf.push(raw);
                    didx += 1;
                }

                tags::VARINT | tags::ZIGZAG => {
                    let (_, sz) = varint::decode(&body[didx + 1..])?;
                    self.buf.extend_from_slice(&body[didx..didx + sz + 1]);
                    didx += sz + 1;
                }

                tags::FLOAT => {
                    self.copy_fixed(body, &mut didx, 5)?;
                }
                tags::DOUBLE => {
                    self.copy_fixed(body, &mut didx, 9)?;
                }
                tags::LONG_DOUBLE => {
                    self.copy_fixed(body, &mut didx, 17)?;
                }

                // Strings dedup against the merger-wide table; repeats
                // become COPY tags aimed at the first literal.
                tags::BINARY | tags::STR_UTF8 => {
                    let (len, sz) = varint::decode(&body[didx + 1..])?;
                    out_rel = self.merge_string(body, &mut didx, len, sz, out_rel)?;
                }
                t if tags::is_short_binary(t) => {
                    let len = tags::short_binary_len(t) as u64;
                    out_rel = self.merge_string(body, &mut didx, len, 0, out_rel)?;
                }

                tags::COPY
                | tags::REFP
                | tags::ALIAS
                | tags::OBJECTV
                | tags::OBJECTV_FREEZE => {
                    let (offset, sz) = varint::decode(&body[didx + 1..])?;
                    let resolved = usize::try_from(offset)
                        .ok()
                        .and_then(|src| track.lookup(src))
                        .flatten()
                        .ok_or(BodyError::BadBackReference { tag, offset })?;

                    self.buf.push(raw);
                    varint::append(&mut self.buf, resolved as u64);
                    didx += sz + 1;

                    if tag == tags::ALIAS {
                        // The referent must carry the track flag so a
                        // decoder materializes an aliasable slot.
                        self.buf[self.body_offset + resolved] |= tags::TRACK_FLAG;
                    } else if tag == tags::OBJECTV || tag == tags::OBJECTV_FREEZE {
                        stack.push(1);
                    }
                }

                tags::ARRAY | tags::HASH => {
                    let (len, sz) = varint::decode(&body[didx + 1..])?;
                    let len = i64::try_from(len).map_err(|_| BodyError::BadArrayOrHashLength)?;
                    let children = if tag == tags::HASH {
                        len.checked_mul(2).ok_or(BodyError::BadArrayOrHashLength)?
                    } else {
                        len
                    };
                    self.buf.extend_from_slice(&body[didx..didx + sz + 1]);
                    didx += sz + 1;
                    stack.push(children);
                }

                t if tags::is_arrayref(t) || tags::is_hashref(t) => {
                    self.buf.push(raw);
                    didx += 1;
                    let n = tags::small_ref_len(t) as i64;
                    stack.push(if tags::is_hashref(t) { n * 2 } else { n });
                }

                // Pattern and modifier strings travel verbatim; neither
                // participates in the string table.
                tags::REGEXP => {
                    let (pat_at, pat) = read_string(&body[didx + 1..])?;
                    let mut total = 1 + pat_at + pat.len();
                    let (mod_at, modifiers) = read_string(&body[didx + total..])?;
                    total += mod_at + modifiers.len();
                    self.buf.extend_from_slice(&body[didx..didx + total]);
                    didx += total;
                }

                tags::OBJECT | tags::OBJECT_FREEZE => {
                    let (name_at, class) = read_string(&body[didx + 1..])?;
                    let total = 1 + name_at + class.len();

                    if let Some(&saved) = self.obj_table.get(class) {
                        self.buf.push(if tag == tags::OBJECT {
                            tags::OBJECTV
                        } else {
                            tags::OBJECTV_FREEZE
                        });
                        varint::append(&mut self.buf, saved as u64);
                        out_rel = saved;
                    } else {
                        // The table refers to the class-name string tag,
                        // one byte past the object tag, matching OBJECTV
                        // semantics.
                        out_rel += 1;
                        self.obj_table.insert(class.to_vec(), out_rel);
                        self.buf.extend_from_slice(&body[didx..didx + total]);
                    }

                    // The object payload is the scope's single child.
                    stack.push(1);
                    didx += total;
                }

                tags::PACKET_START => return Err(BodyError::UnexpectedPacketStart),

                _ => {
                    return Err(BodyError::UnknownTag {
                        tag,
                        offset: didx,
                    })
                }
            }

            stack[level] -= 1;

            if trackme {
                track.resolve_next(out_rel);
            }
        }

        let mut level = stack.len() - 1;
        while stack[level] == 0 {
            stack.pop();
            level -= 1;
        }
        if stack.len() > 1 {
            return Err(BodyError::UnclosedContainers {
                open: stack.len() - 1,
            });
        }

        if self.buf.len() > reserve_limit {
            return Err(BodyError::ReservationViolated);
        }

        Ok(u64::try_from(-(stack[0] + 1)).unwrap_or(0))
    }

    /// Copies a fixed-width tag (tag byte plus payload) verbatim.
    #[inline]
    fn copy_fixed(&mut self, body: &[u8], didx: &mut usize, width: usize) -> Result<(), BodyError> {
        if *didx + width > body.len() {
            return Err(BodyError::Truncated);
        }
        self.buf.extend_from_slice(&body[*didx..*didx + width]);
        *didx += width;
        Ok(())
    }

    /// Copies or dedups one string tag; returns its effective output
    /// offset (the first-occurrence offset when dedup'd, so back-pointers
    /// aimed here resolve to the literal rather than the COPY).
    fn merge_string(
        &mut self,
        body: &[u8],
        didx: &mut usize,
        len: u64,
        varint_len: usize,
        out_rel: usize,
    ) -> Result<usize, BodyError> {
        if len > u64::from(u32::MAX) {
            return Err(BodyError::BadStringLength(len));
        }
        let total = 1 + varint_len + len as usize;
        if *didx + total > body.len() {
            return Err(BodyError::Truncated);
        }

        let payload = &body[*didx + 1 + varint_len..*didx + total];
        let effective = if let Some(&saved) = self.str_table.get(payload) {
            self.buf.push(tags::COPY);
            varint::append(&mut self.buf, saved as u64);
            saved
        } else {
            self.str_table.insert(payload.to_vec(), out_rel);
            self.buf.extend_from_slice(&body[*didx..*didx + total]);
            out_rel
        };

        *didx += total;
        Ok(effective)
    }
}

/// Parses a string-shaped tag: `BINARY`, `STR_UTF8`, or `SHORT_BINARY_*`.
///
/// Returns the payload's start offset within `buf` (tag byte plus any
/// length varint) and the payload itself. Used for class names and regexp
/// operands, which must be string-shaped.
fn read_string(buf: &[u8]) -> Result<(usize, &[u8]), BodyError> {
    let raw = *buf.first().ok_or(BodyError::Truncated)?;
    let tag = raw & !tags::TRACK_FLAG;
    if !tags::is_stringish(tag) {
        return Err(BodyError::BadStringTag(tag));
    }

    let (len, varint_len) = if tag >= tags::SHORT_BINARY_0 {
        (tags::short_binary_len(tag) as u64, 0)
    } else {
        varint::decode(&buf[1..])?
    };
    if len > u64::from(u32::MAX) {
        return Err(BodyError::BadStringLength(len));
    }

    let len = len as usize;
    let payload_start = 1 + varint_len;
    if payload_start + len > buf.len() {
        return Err(BodyError::Truncated);
    }
    Ok((payload_start, &buf[payload_start..payload_start + len]))
}
