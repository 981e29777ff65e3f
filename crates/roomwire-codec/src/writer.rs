//! Encoding side of the codec.

use crate::order;
use crate::{CodecError, Dict, Object, Registry, Tag, Value};

const MAX_U8_LEN: usize = u8::MAX as usize;
const MAX_U16_LEN: usize = u16::MAX as usize;

/// Appends tagged values to a growable buffer.
///
/// A `Writer` is cheap to create; the session layer makes a fresh one per
/// outgoing frame instead of sharing a scratch buffer between threads.
pub struct Writer<'r> {
    buf: Vec<u8>,
    registry: &'r Registry,
}

impl<'r> Writer<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self::with_capacity(registry, 64)
    }

    pub fn with_capacity(registry: &'r Registry, capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            registry,
        }
    }

    /// Continues writing after bytes that are already in `buf`
    /// (e.g. a frame header).
    pub fn from_vec(registry: &'r Registry, buf: Vec<u8>) -> Self {
        Self { buf, registry }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Appends bytes without a tag.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn tag(&mut self, tag: Tag) {
        self.buf.push(tag.into());
    }

    // -- scalars ----------------------------------------------------------

    pub fn write_null(&mut self) {
        self.tag(Tag::Null);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.tag(if v { Tag::True } else { Tag::False });
    }

    pub fn write_sbyte(&mut self, v: i8) {
        self.tag(Tag::SByte);
        self.buf.push(order::i8_to_wire(v));
    }

    pub fn write_byte(&mut self, v: u8) {
        self.tag(Tag::Byte);
        self.buf.push(v);
    }

    pub fn write_char(&mut self, v: char) -> Result<(), CodecError> {
        let unit = char_unit(v)?;
        self.tag(Tag::Char);
        self.buf.extend_from_slice(&unit.to_be_bytes());
        Ok(())
    }

    pub fn write_short(&mut self, v: i16) {
        self.tag(Tag::Short);
        self.buf.extend_from_slice(&order::i16_to_wire(v));
    }

    pub fn write_ushort(&mut self, v: u16) {
        self.tag(Tag::UShort);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_int(&mut self, v: i32) {
        self.tag(Tag::Int);
        self.buf.extend_from_slice(&order::i32_to_wire(v));
    }

    pub fn write_uint(&mut self, v: u32) {
        self.tag(Tag::UInt);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_long(&mut self, v: i64) {
        self.tag(Tag::Long);
        self.buf.extend_from_slice(&order::i64_to_wire(v));
    }

    pub fn write_ulong(&mut self, v: u64) {
        self.tag(Tag::ULong);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_float(&mut self, v: f32) {
        self.tag(Tag::Float);
        self.buf.extend_from_slice(&order::f32_to_wire(v));
    }

    pub fn write_double(&mut self, v: f64) {
        self.tag(Tag::Double);
        self.buf.extend_from_slice(&order::f64_to_wire(v));
    }

    /// Writes a string as `Str8` when it fits in 255 bytes, `Str16` otherwise.
    pub fn write_str(&mut self, v: &str) -> Result<(), CodecError> {
        let len = v.len();
        if len <= MAX_U8_LEN {
            self.tag(Tag::Str8);
            self.buf.push(len as u8);
        } else if len <= MAX_U16_LEN {
            self.tag(Tag::Str16);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            return Err(CodecError::TooLong {
                what: "string",
                len,
                max: MAX_U16_LEN,
            });
        }
        self.buf.extend_from_slice(v.as_bytes());
        Ok(())
    }

    // -- compound values --------------------------------------------------

    /// Writes a registered object: `[Obj][class id][len:2][body]`.
    pub fn write_object(&mut self, obj: &dyn Object) -> Result<(), CodecError> {
        let class_id = self
            .registry
            .class_id_of(obj.as_any().type_id())
            .ok_or(CodecError::UnregisteredType(obj.type_name()))?;
        self.rollback_on_error(|w| {
            w.tag(Tag::Obj);
            w.buf.push(class_id);
            w.length_prefixed("object", |w| obj.serialize(w))
        })
    }

    /// Writes a list: `[List][count:1]` then `[len:2][value]` per element.
    pub fn write_list(&mut self, items: &[Value]) -> Result<(), CodecError> {
        check_len("list", items.len(), MAX_U8_LEN)?;
        self.rollback_on_error(|w| {
            w.tag(Tag::List);
            w.buf.push(items.len() as u8);
            for item in items {
                w.length_prefixed("list element", |w| w.write_value(item))?;
            }
            Ok(())
        })
    }

    /// Writes a dictionary: `[Dict][count:1]` then
    /// `[keylen:1][key][len:2][value]` per entry, in key order.
    pub fn write_dict(&mut self, dict: &Dict) -> Result<(), CodecError> {
        check_len("dict", dict.len(), MAX_U8_LEN)?;
        self.rollback_on_error(|w| {
            w.tag(Tag::Dict);
            w.buf.push(dict.len() as u8);
            for (key, value) in dict {
                check_len("dict key", key.len(), MAX_U8_LEN)?;
                w.buf.push(key.len() as u8);
                w.buf.extend_from_slice(key.as_bytes());
                w.length_prefixed("dict value", |w| w.write_value(value))?;
            }
            Ok(())
        })
    }

    /// Reserves a 16-bit length, runs `body`, then patches the length in.
    fn length_prefixed<F>(&mut self, what: &'static str, body: F) -> Result<(), CodecError>
    where
        F: FnOnce(&mut Self) -> Result<(), CodecError>,
    {
        self.rollback_on_error(|w| {
            let at = w.buf.len();
            w.buf.extend_from_slice(&[0, 0]);
            body(w)?;
            let len = w.buf.len() - at - 2;
            check_len(what, len, MAX_U16_LEN)?;
            w.buf[at..at + 2].copy_from_slice(&(len as u16).to_be_bytes());
            Ok(())
        })
    }

    /// Runs `write`, cutting the buffer back to where it started if it
    /// fails. A failed compound write leaves nothing behind.
    fn rollback_on_error<F>(&mut self, write: F) -> Result<(), CodecError>
    where
        F: FnOnce(&mut Self) -> Result<(), CodecError>,
    {
        let start = self.buf.len();
        let result = write(self);
        if result.is_err() {
            self.buf.truncate(start);
        }
        result
    }

    // -- typed arrays -----------------------------------------------------

    fn array_header(&mut self, tag: Tag, count: usize) -> Result<(), CodecError> {
        check_len("array", count, MAX_U16_LEN)?;
        self.tag(tag);
        self.buf.extend_from_slice(&(count as u16).to_be_bytes());
        Ok(())
    }

    /// Bools are bit-packed, most significant bit first.
    pub fn write_bools(&mut self, v: &[bool]) -> Result<(), CodecError> {
        self.array_header(Tag::Bools, v.len())?;
        for chunk in v.chunks(8) {
            let mut byte = 0u8;
            for (i, b) in chunk.iter().enumerate() {
                if *b {
                    byte |= 0x80 >> i;
                }
            }
            self.buf.push(byte);
        }
        Ok(())
    }

    pub fn write_sbytes(&mut self, v: &[i8]) -> Result<(), CodecError> {
        self.array_header(Tag::SBytes, v.len())?;
        self.buf.extend(v.iter().map(|x| order::i8_to_wire(*x)));
        Ok(())
    }

    pub fn write_bytes(&mut self, v: &[u8]) -> Result<(), CodecError> {
        self.array_header(Tag::Bytes, v.len())?;
        self.buf.extend_from_slice(v);
        Ok(())
    }

    pub fn write_chars(&mut self, v: &[char]) -> Result<(), CodecError> {
        let units = v
            .iter()
            .map(|c| char_unit(*c))
            .collect::<Result<Vec<_>, _>>()?;
        self.array_header(Tag::Chars, units.len())?;
        for unit in units {
            self.buf.extend_from_slice(&unit.to_be_bytes());
        }
        Ok(())
    }

    pub fn write_shorts(&mut self, v: &[i16]) -> Result<(), CodecError> {
        self.array_header(Tag::Shorts, v.len())?;
        for x in v {
            self.buf.extend_from_slice(&order::i16_to_wire(*x));
        }
        Ok(())
    }

    pub fn write_ushorts(&mut self, v: &[u16]) -> Result<(), CodecError> {
        self.array_header(Tag::UShorts, v.len())?;
        for x in v {
            self.buf.extend_from_slice(&x.to_be_bytes());
        }
        Ok(())
    }

    pub fn write_ints(&mut self, v: &[i32]) -> Result<(), CodecError> {
        self.array_header(Tag::Ints, v.len())?;
        for x in v {
            self.buf.extend_from_slice(&order::i32_to_wire(*x));
        }
        Ok(())
    }

    pub fn write_uints(&mut self, v: &[u32]) -> Result<(), CodecError> {
        self.array_header(Tag::UInts, v.len())?;
        for x in v {
            self.buf.extend_from_slice(&x.to_be_bytes());
        }
        Ok(())
    }

    pub fn write_longs(&mut self, v: &[i64]) -> Result<(), CodecError> {
        self.array_header(Tag::Longs, v.len())?;
        for x in v {
            self.buf.extend_from_slice(&order::i64_to_wire(*x));
        }
        Ok(())
    }

    pub fn write_ulongs(&mut self, v: &[u64]) -> Result<(), CodecError> {
        self.array_header(Tag::ULongs, v.len())?;
        for x in v {
            self.buf.extend_from_slice(&x.to_be_bytes());
        }
        Ok(())
    }

    pub fn write_floats(&mut self, v: &[f32]) -> Result<(), CodecError> {
        self.array_header(Tag::Floats, v.len())?;
        for x in v {
            self.buf.extend_from_slice(&order::f32_to_wire(*x));
        }
        Ok(())
    }

    pub fn write_doubles(&mut self, v: &[f64]) -> Result<(), CodecError> {
        self.array_header(Tag::Doubles, v.len())?;
        for x in v {
            self.buf.extend_from_slice(&order::f64_to_wire(*x));
        }
        Ok(())
    }

    // -- dynamic ----------------------------------------------------------

    /// Writes any [`Value`] with the tag matching its variant.
    pub fn write_value(&mut self, value: &Value) -> Result<(), CodecError> {
        match value {
            Value::Null => self.write_null(),
            Value::Bool(v) => self.write_bool(*v),
            Value::SByte(v) => self.write_sbyte(*v),
            Value::Byte(v) => self.write_byte(*v),
            Value::Char(v) => self.write_char(*v)?,
            Value::Short(v) => self.write_short(*v),
            Value::UShort(v) => self.write_ushort(*v),
            Value::Int(v) => self.write_int(*v),
            Value::UInt(v) => self.write_uint(*v),
            Value::Long(v) => self.write_long(*v),
            Value::ULong(v) => self.write_ulong(*v),
            Value::Float(v) => self.write_float(*v),
            Value::Double(v) => self.write_double(*v),
            Value::Str(v) => self.write_str(v)?,
            Value::Obj(v) => self.write_object(v.as_ref())?,
            Value::List(v) => self.write_list(v)?,
            Value::Dict(v) => self.write_dict(v)?,
            Value::Bools(v) => self.write_bools(v)?,
            Value::SBytes(v) => self.write_sbytes(v)?,
            Value::Bytes(v) => self.write_bytes(v)?,
            Value::Chars(v) => self.write_chars(v)?,
            Value::Shorts(v) => self.write_shorts(v)?,
            Value::UShorts(v) => self.write_ushorts(v)?,
            Value::Ints(v) => self.write_ints(v)?,
            Value::UInts(v) => self.write_uints(v)?,
            Value::Longs(v) => self.write_longs(v)?,
            Value::ULongs(v) => self.write_ulongs(v)?,
            Value::Floats(v) => self.write_floats(v)?,
            Value::Doubles(v) => self.write_doubles(v)?,
        }
        Ok(())
    }
}

fn check_len(what: &'static str, len: usize, max: usize) -> Result<(), CodecError> {
    if len > max {
        return Err(CodecError::TooLong { what, len, max });
    }
    Ok(())
}

fn char_unit(c: char) -> Result<u16, CodecError> {
    u16::try_from(c as u32).map_err(|_| CodecError::InvalidChar(c as u32))
}
