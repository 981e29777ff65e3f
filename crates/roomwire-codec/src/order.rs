//! Order-preserving scalar transforms.
//!
//! The server compares encoded property values byte-by-byte when it
//! evaluates search queries, so every numeric encoding must sort the same
//! way as the numbers themselves:
//!
//! - signed integers are shifted by the type minimum (equivalently, the
//!   sign bit is flipped), so `i32::MIN` encodes as `00 00 00 00`;
//! - floats flip only the sign bit when non-negative and invert every bit
//!   when negative, so larger negative magnitudes sort first.
//!
//! All multi-byte values are big-endian.

#[inline]
pub(crate) fn i8_to_wire(v: i8) -> u8 {
    (v as u8) ^ 0x80
}

#[inline]
pub(crate) fn i8_from_wire(b: u8) -> i8 {
    (b ^ 0x80) as i8
}

#[inline]
pub(crate) fn i16_to_wire(v: i16) -> [u8; 2] {
    ((v as u16) ^ 0x8000).to_be_bytes()
}

#[inline]
pub(crate) fn i16_from_wire(b: [u8; 2]) -> i16 {
    (u16::from_be_bytes(b) ^ 0x8000) as i16
}

#[inline]
pub(crate) fn i32_to_wire(v: i32) -> [u8; 4] {
    ((v as u32) ^ 0x8000_0000).to_be_bytes()
}

#[inline]
pub(crate) fn i32_from_wire(b: [u8; 4]) -> i32 {
    (u32::from_be_bytes(b) ^ 0x8000_0000) as i32
}

#[inline]
pub(crate) fn i64_to_wire(v: i64) -> [u8; 8] {
    ((v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()
}

#[inline]
pub(crate) fn i64_from_wire(b: [u8; 8]) -> i64 {
    (u64::from_be_bytes(b) ^ 0x8000_0000_0000_0000) as i64
}

#[inline]
pub(crate) fn f32_to_wire(v: f32) -> [u8; 4] {
    let bits = v.to_bits();
    let flipped = if bits & 0x8000_0000 == 0 {
        bits ^ 0x8000_0000
    } else {
        !bits
    };
    flipped.to_be_bytes()
}

#[inline]
pub(crate) fn f32_from_wire(b: [u8; 4]) -> f32 {
    let bits = u32::from_be_bytes(b);
    let raw = if bits & 0x8000_0000 != 0 {
        bits ^ 0x8000_0000
    } else {
        !bits
    };
    f32::from_bits(raw)
}

#[inline]
pub(crate) fn f64_to_wire(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    let flipped = if bits & 0x8000_0000_0000_0000 == 0 {
        bits ^ 0x8000_0000_0000_0000
    } else {
        !bits
    };
    flipped.to_be_bytes()
}

#[inline]
pub(crate) fn f64_from_wire(b: [u8; 8]) -> f64 {
    let bits = u64::from_be_bytes(b);
    let raw = if bits & 0x8000_0000_0000_0000 != 0 {
        bits ^ 0x8000_0000_0000_0000
    } else {
        !bits
    };
    f64::from_bits(raw)
}
