//! Error types for the binary codec.
//!
//! Every variant is fatal for the buffer being processed: the codec never
//! tries to resynchronise after a bad tag or a short read. Callers higher
//! up (the session layer) treat any of these as a protocol violation.

use crate::Tag;

/// Errors that can occur while encoding or decoding [`Value`](crate::Value)s.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The buffer ended before a complete value could be read.
    #[error("truncated buffer: need {needed} bytes at offset {offset}, {available} left")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The tag byte doesn't name any known type.
    #[error("unknown type tag {0}")]
    UnknownTag(u8),

    /// A typed read found a different tag than it asked for.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: Tag },

    /// An object carried a class id nobody registered.
    #[error("class id {0} is not registered")]
    UnregisteredClass(u8),

    /// An object of an unregistered Rust type was written.
    #[error("type {0} is not registered")]
    UnregisteredType(&'static str),

    /// The class id is already taken by another type.
    #[error("class id {0} is already registered")]
    DuplicateClassId(u8),

    /// The Rust type is already registered under another class id.
    #[error("type {0} is already registered")]
    DuplicateType(&'static str),

    /// A string, collection or object body exceeds its length prefix.
    #[error("{what} too long: {len} exceeds maximum {max}")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// Lists, dictionaries and objects are nested deeper than the reader
    /// accepts.
    #[error("values nested deeper than {max} levels")]
    NestingTooDeep { max: usize },

    /// A length-prefixed element held bytes after its value.
    #[error("element declared {declared} bytes but left {unread} unread")]
    LengthMismatch { declared: usize, unread: usize },

    /// String bytes are not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A char cannot be represented as a single UTF-16 unit (or a
    /// decoded unit is a lone surrogate).
    #[error("char U+{0:04X} cannot be encoded as a single UTF-16 unit")]
    InvalidChar(u32),
}
