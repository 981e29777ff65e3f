//! Wire type tags.
//!
//! The numeric values are part of the wire format and must never change.

use std::fmt;

use crate::CodecError;

/// The first byte of every encoded value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Null = 0,
    False = 1,
    True = 2,
    SByte = 3,
    Byte = 4,
    Char = 5,
    Short = 6,
    UShort = 7,
    Int = 8,
    UInt = 9,
    Long = 10,
    ULong = 11,
    Float = 12,
    Double = 13,
    Str8 = 14,
    Str16 = 15,
    Obj = 16,
    List = 17,
    Dict = 18,
    Bools = 19,
    SBytes = 20,
    Bytes = 21,
    Chars = 22,
    Shorts = 23,
    UShorts = 24,
    Ints = 25,
    UInts = 26,
    Longs = 27,
    ULongs = 28,
    Floats = 29,
    Doubles = 30,
}

impl Tag {
    /// Every tag in wire order. Index `i` holds the tag whose value is `i`.
    const ALL: [Tag; 31] = [
        Tag::Null,
        Tag::False,
        Tag::True,
        Tag::SByte,
        Tag::Byte,
        Tag::Char,
        Tag::Short,
        Tag::UShort,
        Tag::Int,
        Tag::UInt,
        Tag::Long,
        Tag::ULong,
        Tag::Float,
        Tag::Double,
        Tag::Str8,
        Tag::Str16,
        Tag::Obj,
        Tag::List,
        Tag::Dict,
        Tag::Bools,
        Tag::SBytes,
        Tag::Bytes,
        Tag::Chars,
        Tag::Shorts,
        Tag::UShorts,
        Tag::Ints,
        Tag::UInts,
        Tag::Longs,
        Tag::ULongs,
        Tag::Floats,
        Tag::Doubles,
    ];

    /// Size in bytes of the payload that follows a fixed-width scalar tag,
    /// or `None` for variable-length types.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Tag::Null | Tag::False | Tag::True => Some(0),
            Tag::SByte | Tag::Byte => Some(1),
            Tag::Char | Tag::Short | Tag::UShort => Some(2),
            Tag::Int | Tag::UInt | Tag::Float => Some(4),
            Tag::Long | Tag::ULong | Tag::Double => Some(8),
            _ => None,
        }
    }

    /// Width of one element of a typed array, `None` for non-array tags.
    /// `Bools` reports 0 because its elements are bit-packed.
    pub fn element_size(self) -> Option<usize> {
        match self {
            Tag::Bools => Some(0),
            Tag::SBytes | Tag::Bytes => Some(1),
            Tag::Chars | Tag::Shorts | Tag::UShorts => Some(2),
            Tag::Ints | Tag::UInts | Tag::Floats => Some(4),
            Tag::Longs | Tag::ULongs | Tag::Doubles => Some(8),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Tag {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Tag::ALL
            .get(value as usize)
            .copied()
            .ok_or(CodecError::UnknownTag(value))
    }
}

impl From<Tag> for u8 {
    fn from(tag: Tag) -> u8 {
        tag as u8
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
