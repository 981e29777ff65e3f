//! Binary codec for Roomwire.
//!
//! A compact, self-describing format: every value starts with a one-byte
//! [`Tag`], compound values carry length prefixes so a reader can skip them
//! without decoding, and numeric encodings sort byte-wise in the same order
//! as the numbers they represent (the server relies on this to evaluate
//! search queries against encoded properties).
//!
//! - [`Value`]: the dynamic value model (props, query operands, payloads)
//! - [`Writer`] / [`Reader`]: typed and dynamic encoding/decoding
//! - [`Registry`]: class ids for application types ([`Serializable`])
//! - [`CodecError`]: everything that can go wrong
//!
//! ```rust
//! use roomwire_codec::{decode, encode, Dict, Value};
//!
//! let mut props = Dict::new();
//! props.insert("level".into(), Value::Int(3));
//! props.insert("name".into(), "dungeon".into());
//!
//! let bytes = encode(&Value::Dict(props.clone())).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), Value::Dict(props));
//! ```

mod error;
mod order;
mod reader;
mod registry;
mod tag;
mod value;
mod writer;

pub use error::CodecError;
pub use reader::{MAX_NESTING, Reader};
pub use registry::Registry;
pub use tag::Tag;
pub use value::{Dict, Object, Serializable, Value};
pub use writer::Writer;

/// Encodes a single value. Objects require [`encode_with`] and a registry.
pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    encode_with(value, Registry::empty())
}

/// Encodes a single value, resolving object class ids through `registry`.
pub fn encode_with(value: &Value, registry: &Registry) -> Result<Vec<u8>, CodecError> {
    let mut w = Writer::new(registry);
    w.write_value(value)?;
    Ok(w.into_bytes())
}

/// Decodes the first value in `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    decode_with(bytes, Registry::empty())
}

/// Decodes a single value, constructing objects through `registry`.
///
/// Trailing bytes after the value are ignored.
pub fn decode_with(bytes: &[u8], registry: &Registry) -> Result<Value, CodecError> {
    Reader::new(bytes, registry).read_value()
}
