//! Track-table construction: the first pass over a raw body.
//!
//! Back-reference tags name byte offsets that can occur in the stream
//! before the tag that references them, so offsets cannot be remapped in a
//! single pass. This pass walks every tag, validates the structure it
//! needs for width computation, and records the set of source offsets that
//! are either flagged for tracking or named by a back-reference. The
//! second pass then resolves each entry to an output offset the moment it
//! copies the tag that lives there.
//!
//! Offsets are 1-based and body-relative: the first body byte is offset 1.
//!
//! # Invariants
//! - `order` holds exactly the keys of `slots`, sorted ascending.
//! - Entries are resolved strictly in `order`; the cursor never moves
//!   backwards.

use ahash::AHashMap;

use crate::errors::BodyError;
use crate::tags;
use crate::varint;

/// Per-document offset bookkeeping shared by the two merge passes.
#[derive(Debug, Default)]
pub struct TrackTable {
    /// Source-relative offset to output-relative offset; `None` until the
    /// second pass reaches the source position.
    slots: AHashMap<usize, Option<usize>>,
    /// Keys of `slots`, ascending.
    order: Vec<usize>,
    /// Cursor into `order`: next entry awaiting resolution.
    next: usize,
}

impl TrackTable {
    /// Scans `body` and records every offset that may be referenced.
    ///
    /// # Errors
    /// Truncation, bad string lengths, forward or self back-references,
    /// unknown tags, and a nested `PACKET_START` are all structural
    /// failures.
    pub fn build(body: &[u8]) -> Result<Self, BodyError> {
        let mut slots: AHashMap<usize, Option<usize>> = AHashMap::new();
        let mut idx = 0usize;

        while idx < body.len() {
            let raw = body[idx];
            if raw & tags::TRACK_FLAG != 0 {
                // 1-based body offset of this tag.
                slots.insert(idx + 1, None);
            }
            let tag = raw & !tags::TRACK_FLAG;

            match tag {
                t if t < tags::VARINT => idx += 1,

                tags::PAD
                | tags::REFN
                | tags::WEAKEN
                | tags::UNDEF
                | tags::CANONICAL_UNDEF
                | tags::TRUE
                | tags::FALSE
                | tags::EXTEND
                | tags::REGEXP
                | tags::OBJECT
                | tags::OBJECT_FREEZE => idx += 1,

                tags::VARINT | tags::ZIGZAG => {
                    let (_, sz) = varint::decode(&body[idx + 1..])?;
                    idx += sz + 1;
                }

                tags::FLOAT => idx += 5,
                tags::DOUBLE => idx += 9,
                tags::LONG_DOUBLE => idx += 17,

                tags::BINARY | tags::STR_UTF8 => {
                    let (len, sz) = varint::decode(&body[idx + 1..])?;
                    if len > u64::from(u32::MAX) {
                        return Err(BodyError::BadStringLength(len));
                    }
                    idx += 1 + sz + len as usize;
                    if idx > body.len() {
                        return Err(BodyError::Truncated);
                    }
                }

                tags::ARRAY | tags::HASH => {
                    let (_, sz) = varint::decode(&body[idx + 1..])?;
                    idx += sz + 1;
                }

                tags::COPY
                | tags::ALIAS
                | tags::REFP
                | tags::OBJECTV
                | tags::OBJECTV_FREEZE => {
                    let (offset, sz) = varint::decode(&body[idx + 1..])?;
                    // A valid target lies strictly behind the tag.
                    if offset >= idx as u64 {
                        return Err(BodyError::BadBackReference { tag, offset });
                    }
                    slots.insert(offset as usize, None);
                    idx += sz + 1;
                }

                t if tags::is_arrayref(t) || tags::is_hashref(t) => idx += 1,

                t if tags::is_short_binary(t) => {
                    idx += 1 + tags::short_binary_len(t);
                }

                tags::PACKET_START => return Err(BodyError::UnexpectedPacketStart),

                _ => return Err(BodyError::UnknownTag { tag, offset: idx }),
            }
        }

        let mut order: Vec<usize> = slots.keys().copied().collect();
        order.sort_unstable();

        Ok(Self {
            slots,
            order,
            next: 0,
        })
    }

    /// Source offset of the next unresolved entry, if any.
    #[inline]
    #[must_use]
    pub fn next_pending(&self) -> Option<usize> {
        self.order.get(self.next).copied()
    }

    /// Resolves the head entry to `out_offset` and advances the cursor.
    ///
    /// Callers must have matched `next_pending()` against the current
    /// source offset first.
    #[inline]
    pub fn resolve_next(&mut self, out_offset: usize) {
        let src = self.order[self.next];
        self.slots.insert(src, Some(out_offset));
        self.next += 1;
    }

    /// Resolved output offset for `src_offset`.
    ///
    /// `None` means the offset was never discovered; `Some(None)` means it
    /// was discovered but the second pass has not reached it (a forward
    /// reference, which the format forbids).
    #[inline]
    #[must_use]
    pub fn lookup(&self, src_offset: usize) -> Option<Option<usize>> {
        self.slots.get(&src_offset).copied()
    }

    /// Number of discovered offsets.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
