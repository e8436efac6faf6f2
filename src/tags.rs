//! Sereal tag byte constants and classification helpers.
//!
//! Tag bytes occupy the low 7 bits; the high bit is the *track* flag, which
//! marks a position as a potential back-reference target. Everything here
//! expects the flag to be cleared first (`tag & !TRACK_FLAG`) unless noted.

/// High bit of a tag byte: this position may be the target of a
/// back-reference and the decoder must remember it.
pub const TRACK_FLAG: u8 = 0x80;

/// Small positive integers 0..=15 occupy `0x00..=0x0f`.
pub const POS_0: u8 = 0x00;
/// Small negative integers -16..=-1 occupy `0x10..=0x1f`.
pub const NEG_16: u8 = 0x10;

pub const VARINT: u8 = 0x20;
pub const ZIGZAG: u8 = 0x21;
pub const FLOAT: u8 = 0x22;
pub const DOUBLE: u8 = 0x23;
pub const LONG_DOUBLE: u8 = 0x24;
pub const UNDEF: u8 = 0x25;
pub const BINARY: u8 = 0x26;
pub const STR_UTF8: u8 = 0x27;
pub const REFN: u8 = 0x28;
pub const REFP: u8 = 0x29;
pub const HASH: u8 = 0x2a;
pub const ARRAY: u8 = 0x2b;
pub const OBJECT: u8 = 0x2c;
pub const OBJECTV: u8 = 0x2d;
pub const ALIAS: u8 = 0x2e;
pub const COPY: u8 = 0x2f;
pub const WEAKEN: u8 = 0x30;
pub const REGEXP: u8 = 0x31;
pub const OBJECT_FREEZE: u8 = 0x32;
pub const OBJECTV_FREEZE: u8 = 0x33;
pub const CANONICAL_UNDEF: u8 = 0x39;
pub const FALSE: u8 = 0x3a;
pub const TRUE: u8 = 0x3b;
pub const MANY: u8 = 0x3c;
/// Also the first byte of the document magic (`=`).
pub const PACKET_START: u8 = 0x3d;
pub const EXTEND: u8 = 0x3e;
pub const PAD: u8 = 0x3f;

/// `ARRAYREF_0..=ARRAYREF_15`: array reference with inline length.
pub const ARRAYREF_0: u8 = 0x40;
pub const ARRAYREF_15: u8 = 0x4f;
/// `HASHREF_0..=HASHREF_15`: hash reference with inline pair count.
pub const HASHREF_0: u8 = 0x50;
pub const HASHREF_15: u8 = 0x5f;
/// `SHORT_BINARY_0..=SHORT_BINARY_31`: string with length in the tag.
pub const SHORT_BINARY_0: u8 = 0x60;
pub const SHORT_BINARY_31: u8 = 0x7f;

#[inline]
#[must_use]
pub fn is_arrayref(tag: u8) -> bool {
    (ARRAYREF_0..=ARRAYREF_15).contains(&tag)
}

#[inline]
#[must_use]
pub fn is_hashref(tag: u8) -> bool {
    (HASHREF_0..=HASHREF_15).contains(&tag)
}

#[inline]
#[must_use]
pub fn is_short_binary(tag: u8) -> bool {
    (SHORT_BINARY_0..=SHORT_BINARY_31).contains(&tag)
}

/// String-shaped tags: the shapes accepted for class names and regexp
/// operands.
#[inline]
#[must_use]
pub fn is_stringish(tag: u8) -> bool {
    tag == BINARY || tag == STR_UTF8 || is_short_binary(tag)
}

/// Payload length carried in a `SHORT_BINARY_*` tag byte.
#[inline]
#[must_use]
pub fn short_binary_len(tag: u8) -> usize {
    (tag & 0x1f) as usize
}

/// Inline element count of an `ARRAYREF_*`/`HASHREF_*` tag byte.
#[inline]
#[must_use]
pub fn small_ref_len(tag: u8) -> usize {
    (tag & 0x0f) as usize
}
