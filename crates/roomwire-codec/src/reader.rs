//! Decoding side of the codec.

use std::any::TypeId;

use crate::order;
use crate::{CodecError, Dict, Object, Registry, Tag, Value};

/// Deepest nesting of lists, dictionaries and objects a reader accepts.
pub const MAX_NESTING: usize = 64;

/// Reads tagged values from a byte slice, advancing a cursor.
///
/// Typed reads (`read_int`, `read_str`, ...) fail with
/// [`CodecError::TypeMismatch`] when the next tag is not the requested one;
/// there is no implicit widening on the wire.
///
/// Compound values nested more than [`MAX_NESTING`] levels deep fail with
/// [`CodecError::NestingTooDeep`].
#[derive(Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    registry: &'a Registry,
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8], registry: &'a Registry) -> Self {
        Self {
            buf,
            pos: 0,
            registry,
            depth: 0,
        }
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail of the buffer, without consuming it.
    pub fn rest(&self) -> &'a [u8] {
        let buf = self.buf;
        &buf[self.pos..]
    }

    /// Consumes `n` raw bytes.
    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let buf = self.buf;
        let out = &buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_raw(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_raw(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn i16(&mut self) -> Result<i16, CodecError> {
        Ok(order::i16_from_wire(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(order::i32_from_wire(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(order::i64_from_wire(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, CodecError> {
        Ok(order::f32_from_wire(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        Ok(order::f64_from_wire(self.array()?))
    }

    /// Looks at the next tag without consuming it.
    pub fn peek_tag(&self) -> Result<Tag, CodecError> {
        match self.buf.get(self.pos) {
            Some(b) => Tag::try_from(*b),
            None => Err(CodecError::Truncated {
                offset: self.pos,
                needed: 1,
                available: 0,
            }),
        }
    }

    fn read_tag(&mut self) -> Result<Tag, CodecError> {
        let tag = Tag::try_from(self.u8()?)?;
        Ok(tag)
    }

    fn expect(&mut self, expected: Tag) -> Result<(), CodecError> {
        let found = self.peek_tag()?;
        if found != expected {
            return Err(CodecError::TypeMismatch {
                expected: tag_name(expected),
                found,
            });
        }
        self.pos += 1;
        Ok(())
    }

    /// Splits off a reader one nesting level down over the next `len`
    /// bytes and skips past them.
    fn sub_reader(&mut self, len: usize) -> Result<Reader<'a>, CodecError> {
        if self.depth >= MAX_NESTING {
            return Err(CodecError::NestingTooDeep { max: MAX_NESTING });
        }
        let body = self.read_raw(len)?;
        Ok(Reader {
            buf: body,
            pos: 0,
            registry: self.registry,
            depth: self.depth + 1,
        })
    }

    /// Fails unless a length-prefixed body was read to its end.
    fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            unread => Err(CodecError::LengthMismatch {
                declared: self.buf.len(),
                unread,
            }),
        }
    }

    // -- scalars ----------------------------------------------------------

    pub fn read_null(&mut self) -> Result<(), CodecError> {
        self.expect(Tag::Null)
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.peek_tag()? {
            Tag::True => {
                self.pos += 1;
                Ok(true)
            }
            Tag::False => {
                self.pos += 1;
                Ok(false)
            }
            found => Err(CodecError::TypeMismatch {
                expected: "Bool",
                found,
            }),
        }
    }

    pub fn read_sbyte(&mut self) -> Result<i8, CodecError> {
        self.expect(Tag::SByte)?;
        Ok(order::i8_from_wire(self.u8()?))
    }

    pub fn read_byte(&mut self) -> Result<u8, CodecError> {
        self.expect(Tag::Byte)?;
        self.u8()
    }

    pub fn read_char(&mut self) -> Result<char, CodecError> {
        self.expect(Tag::Char)?;
        let unit = self.u16()?;
        unit_char(unit)
    }

    pub fn read_short(&mut self) -> Result<i16, CodecError> {
        self.expect(Tag::Short)?;
        self.i16()
    }

    pub fn read_ushort(&mut self) -> Result<u16, CodecError> {
        self.expect(Tag::UShort)?;
        self.u16()
    }

    pub fn read_int(&mut self) -> Result<i32, CodecError> {
        self.expect(Tag::Int)?;
        self.i32()
    }

    pub fn read_uint(&mut self) -> Result<u32, CodecError> {
        self.expect(Tag::UInt)?;
        self.u32()
    }

    pub fn read_long(&mut self) -> Result<i64, CodecError> {
        self.expect(Tag::Long)?;
        self.i64()
    }

    pub fn read_ulong(&mut self) -> Result<u64, CodecError> {
        self.expect(Tag::ULong)?;
        self.u64()
    }

    pub fn read_float(&mut self) -> Result<f32, CodecError> {
        self.expect(Tag::Float)?;
        self.f32()
    }

    pub fn read_double(&mut self) -> Result<f64, CodecError> {
        self.expect(Tag::Double)?;
        self.f64()
    }

    /// Reads either a `Str8` or a `Str16`.
    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let len = match self.peek_tag()? {
            Tag::Str8 => {
                self.pos += 1;
                self.u8()? as usize
            }
            Tag::Str16 => {
                self.pos += 1;
                self.u16()? as usize
            }
            found => {
                return Err(CodecError::TypeMismatch {
                    expected: "Str",
                    found,
                });
            }
        };
        let bytes = self.read_raw(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    // -- objects ----------------------------------------------------------

    /// Reads the object header, checking the class id belongs to `T`.
    /// Returns a reader over the object body.
    fn object_body<T: 'static>(&mut self) -> Result<Reader<'a>, CodecError> {
        self.expect(Tag::Obj)?;
        let class_id = self.u8()?;
        if !self.registry.is_class_of(class_id, TypeId::of::<T>()) {
            return Err(match self.registry.type_name(class_id) {
                Some(_) => CodecError::TypeMismatch {
                    expected: std::any::type_name::<T>(),
                    found: Tag::Obj,
                },
                None => CodecError::UnregisteredClass(class_id),
            });
        }
        let len = self.u16()? as usize;
        self.sub_reader(len)
    }

    /// Reads a registered object into a fresh `T`.
    pub fn read_object<T>(&mut self) -> Result<T, CodecError>
    where
        T: Object + Default,
    {
        let mut obj = T::default();
        self.read_object_into(&mut obj)?;
        Ok(obj)
    }

    /// Reads a registered object, overwriting `target` in place.
    pub fn read_object_into<T: Object>(&mut self, target: &mut T) -> Result<(), CodecError> {
        let mut body = self.object_body::<T>()?;
        target.deserialize(&mut body)?;
        body.finish()
    }

    /// Reads an object whose type is only known from its class id.
    fn read_dyn_object(&mut self) -> Result<Box<dyn Object>, CodecError> {
        let class_id = self.u8()?;
        let mut obj = self.registry.construct(class_id)?;
        let len = self.u16()? as usize;
        let mut body = self.sub_reader(len)?;
        obj.deserialize(&mut body)?;
        body.finish()?;
        Ok(obj)
    }

    // -- lists and dictionaries ------------------------------------------

    pub fn read_list(&mut self) -> Result<Vec<Value>, CodecError> {
        let mut out = Vec::new();
        self.read_list_into(&mut out)?;
        Ok(out)
    }

    /// Reads a list into `target`, recycling existing elements position by
    /// position and truncating or growing to the decoded length.
    pub fn read_list_into(&mut self, target: &mut Vec<Value>) -> Result<(), CodecError> {
        self.expect(Tag::List)?;
        let count = self.u8()? as usize;
        target.truncate(count);
        for i in 0..count {
            let len = self.u16()? as usize;
            let mut elem = self.sub_reader(len)?;
            match target.get_mut(i) {
                Some(slot) => elem.read_value_into(slot)?,
                None => target.push(elem.read_value()?),
            }
            elem.finish()?;
        }
        Ok(())
    }

    pub fn read_dict(&mut self) -> Result<Dict, CodecError> {
        let mut out = Dict::new();
        self.read_dict_into(&mut out)?;
        Ok(out)
    }

    /// Reads a dictionary into `target`. Entries whose key reappears are
    /// recycled, keys absent from the encoding are removed.
    pub fn read_dict_into(&mut self, target: &mut Dict) -> Result<(), CodecError> {
        self.expect(Tag::Dict)?;
        let count = self.u8()? as usize;
        let mut old = std::mem::take(target);
        for _ in 0..count {
            let key_len = self.u8()? as usize;
            let key = std::str::from_utf8(self.read_raw(key_len)?)
                .map_err(|_| CodecError::InvalidUtf8)?
                .to_owned();
            let len = self.u16()? as usize;
            let mut elem = self.sub_reader(len)?;
            let mut value = old.remove(&key).unwrap_or_default();
            elem.read_value_into(&mut value)?;
            elem.finish()?;
            target.insert(key, value);
        }
        Ok(())
    }

    // -- typed arrays -----------------------------------------------------

    fn array_count(&mut self, tag: Tag) -> Result<usize, CodecError> {
        self.expect(tag)?;
        Ok(self.u16()? as usize)
    }

    pub fn read_bools(&mut self) -> Result<Vec<bool>, CodecError> {
        let count = self.array_count(Tag::Bools)?;
        let packed = self.read_raw(count.div_ceil(8))?;
        Ok((0..count)
            .map(|i| packed[i / 8] & (0x80 >> (i % 8)) != 0)
            .collect())
    }

    pub fn read_sbytes(&mut self) -> Result<Vec<i8>, CodecError> {
        let count = self.array_count(Tag::SBytes)?;
        Ok(self
            .read_raw(count)?
            .iter()
            .map(|b| order::i8_from_wire(*b))
            .collect())
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let count = self.array_count(Tag::Bytes)?;
        Ok(self.read_raw(count)?.to_vec())
    }

    pub fn read_chars(&mut self) -> Result<Vec<char>, CodecError> {
        let count = self.array_count(Tag::Chars)?;
        (0..count).map(|_| unit_char(self.u16()?)).collect()
    }

    pub fn read_shorts(&mut self) -> Result<Vec<i16>, CodecError> {
        let count = self.array_count(Tag::Shorts)?;
        (0..count).map(|_| self.i16()).collect()
    }

    pub fn read_ushorts(&mut self) -> Result<Vec<u16>, CodecError> {
        let count = self.array_count(Tag::UShorts)?;
        (0..count).map(|_| self.u16()).collect()
    }

    pub fn read_ints(&mut self) -> Result<Vec<i32>, CodecError> {
        let count = self.array_count(Tag::Ints)?;
        (0..count).map(|_| self.i32()).collect()
    }

    pub fn read_uints(&mut self) -> Result<Vec<u32>, CodecError> {
        let count = self.array_count(Tag::UInts)?;
        (0..count).map(|_| self.u32()).collect()
    }

    pub fn read_longs(&mut self) -> Result<Vec<i64>, CodecError> {
        let count = self.array_count(Tag::Longs)?;
        (0..count).map(|_| self.i64()).collect()
    }

    pub fn read_ulongs(&mut self) -> Result<Vec<u64>, CodecError> {
        let count = self.array_count(Tag::ULongs)?;
        (0..count).map(|_| self.u64()).collect()
    }

    pub fn read_floats(&mut self) -> Result<Vec<f32>, CodecError> {
        let count = self.array_count(Tag::Floats)?;
        (0..count).map(|_| self.f32()).collect()
    }

    pub fn read_doubles(&mut self) -> Result<Vec<f64>, CodecError> {
        let count = self.array_count(Tag::Doubles)?;
        (0..count).map(|_| self.f64()).collect()
    }

    // -- dynamic ----------------------------------------------------------

    /// Reads the next value whatever its tag.
    pub fn read_value(&mut self) -> Result<Value, CodecError> {
        let tag = self.peek_tag()?;
        Ok(match tag {
            Tag::Null => {
                self.pos += 1;
                Value::Null
            }
            Tag::False | Tag::True => Value::Bool(self.read_bool()?),
            Tag::SByte => Value::SByte(self.read_sbyte()?),
            Tag::Byte => Value::Byte(self.read_byte()?),
            Tag::Char => Value::Char(self.read_char()?),
            Tag::Short => Value::Short(self.read_short()?),
            Tag::UShort => Value::UShort(self.read_ushort()?),
            Tag::Int => Value::Int(self.read_int()?),
            Tag::UInt => Value::UInt(self.read_uint()?),
            Tag::Long => Value::Long(self.read_long()?),
            Tag::ULong => Value::ULong(self.read_ulong()?),
            Tag::Float => Value::Float(self.read_float()?),
            Tag::Double => Value::Double(self.read_double()?),
            Tag::Str8 | Tag::Str16 => Value::Str(self.read_str()?),
            Tag::Obj => {
                self.pos += 1;
                Value::Obj(self.read_dyn_object()?)
            }
            Tag::List => Value::List(self.read_list()?),
            Tag::Dict => Value::Dict(self.read_dict()?),
            Tag::Bools => Value::Bools(self.read_bools()?),
            Tag::SBytes => Value::SBytes(self.read_sbytes()?),
            Tag::Bytes => Value::Bytes(self.read_bytes()?),
            Tag::Chars => Value::Chars(self.read_chars()?),
            Tag::Shorts => Value::Shorts(self.read_shorts()?),
            Tag::UShorts => Value::UShorts(self.read_ushorts()?),
            Tag::Ints => Value::Ints(self.read_ints()?),
            Tag::UInts => Value::UInts(self.read_uints()?),
            Tag::Longs => Value::Longs(self.read_longs()?),
            Tag::ULongs => Value::ULongs(self.read_ulongs()?),
            Tag::Floats => Value::Floats(self.read_floats()?),
            Tag::Doubles => Value::Doubles(self.read_doubles()?),
        })
    }

    /// Reads the next value into `target`, reusing its allocation when the
    /// shape matches: an object of the same class is deserialized in place,
    /// lists and dictionaries recycle their elements. Anything else is
    /// replaced.
    pub fn read_value_into(&mut self, target: &mut Value) -> Result<(), CodecError> {
        let tag = self.peek_tag()?;
        match (tag, &mut *target) {
            (Tag::Obj, Value::Obj(existing)) => {
                let class_id = self.buf.get(self.pos + 1).copied();
                let same_class = class_id.is_some_and(|id| {
                    self.registry.is_class_of(id, existing.as_any().type_id())
                });
                if same_class {
                    self.pos += 2;
                    let len = self.u16()? as usize;
                    let mut body = self.sub_reader(len)?;
                    existing.deserialize(&mut body)?;
                    body.finish()
                } else {
                    *target = self.read_value()?;
                    Ok(())
                }
            }
            (Tag::List, Value::List(items)) => self.read_list_into(items),
            (Tag::Dict, Value::Dict(entries)) => self.read_dict_into(entries),
            _ => {
                *target = self.read_value()?;
                Ok(())
            }
        }
    }

    /// Skips the next value without decoding it. Compound values are
    /// skipped by their length prefixes.
    pub fn skip(&mut self) -> Result<(), CodecError> {
        let tag = self.read_tag()?;
        let len = match tag {
            Tag::Str8 => self.u8()? as usize,
            Tag::Str16 => self.u16()? as usize,
            Tag::Obj => {
                self.u8()?;
                self.u16()? as usize
            }
            Tag::List => {
                let count = self.u8()?;
                for _ in 0..count {
                    let len = self.u16()? as usize;
                    self.read_raw(len)?;
                }
                0
            }
            Tag::Dict => {
                let count = self.u8()?;
                for _ in 0..count {
                    let key_len = self.u8()? as usize;
                    self.read_raw(key_len)?;
                    let len = self.u16()? as usize;
                    self.read_raw(len)?;
                }
                0
            }
            Tag::Bools => self.u16()?.div_ceil(8) as usize,
            _ => match (tag.fixed_size(), tag.element_size()) {
                (Some(size), _) => size,
                (None, Some(width)) => self.u16()? as usize * width,
                (None, None) => 0,
            },
        };
        self.read_raw(len)?;
        Ok(())
    }
}

fn unit_char(unit: u16) -> Result<char, CodecError> {
    char::from_u32(unit.into()).ok_or(CodecError::InvalidChar(unit.into()))
}

fn tag_name(tag: Tag) -> &'static str {
    match tag {
        Tag::Null => "Null",
        Tag::False | Tag::True => "Bool",
        Tag::SByte => "SByte",
        Tag::Byte => "Byte",
        Tag::Char => "Char",
        Tag::Short => "Short",
        Tag::UShort => "UShort",
        Tag::Int => "Int",
        Tag::UInt => "UInt",
        Tag::Long => "Long",
        Tag::ULong => "ULong",
        Tag::Float => "Float",
        Tag::Double => "Double",
        Tag::Str8 | Tag::Str16 => "Str",
        Tag::Obj => "Obj",
        Tag::List => "List",
        Tag::Dict => "Dict",
        Tag::Bools => "Bools",
        Tag::SBytes => "SBytes",
        Tag::Bytes => "Bytes",
        Tag::Chars => "Chars",
        Tag::Shorts => "Shorts",
        Tag::UShorts => "UShorts",
        Tag::Ints => "Ints",
        Tag::UInts => "UInts",
        Tag::Longs => "Longs",
        Tag::ULongs => "ULongs",
        Tag::Floats => "Floats",
        Tag::Doubles => "Doubles",
    }
}
