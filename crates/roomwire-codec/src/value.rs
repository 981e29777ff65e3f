//! The dynamic value model.
//!
//! [`Value`] is what travels inside property dictionaries, query operands
//! and RPC payloads when the receiver doesn't know the concrete type up
//! front. Application types plug in through [`Serializable`] and a class id
//! in the [`Registry`](crate::Registry).

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::{CodecError, Reader, Tag, Writer};

/// A string-keyed dictionary of values.
///
/// `BTreeMap` keeps keys sorted, so encoding a dictionary is deterministic.
pub type Dict = BTreeMap<String, Value>;

/// An application-defined type that can travel as a `Tag::Obj` value.
///
/// `serialize` writes the object's fields as a sequence of tagged values;
/// `deserialize` reads them back *into* `self`, which is what makes
/// recycling possible: decoding the same object every tick overwrites the
/// existing instance instead of allocating a new one.
pub trait Serializable: fmt::Debug + Send + Sync + 'static {
    /// Writes this object's body.
    fn serialize(&self, writer: &mut Writer<'_>) -> Result<(), CodecError>;

    /// Overwrites this object's fields from `reader`.
    fn deserialize(&mut self, reader: &mut Reader<'_>) -> Result<(), CodecError>;
}

/// Object-safe view of a registered type, used by [`Value::Obj`].
///
/// Implemented automatically for every `Serializable + Clone + PartialEq`.
pub trait Object: Serializable {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_object(&self) -> Box<dyn Object>;
    fn eq_object(&self, other: &dyn Object) -> bool;
    fn type_name(&self) -> &'static str;
}

impl<T> Object for T
where
    T: Serializable + Clone + PartialEq,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_object(&self) -> Box<dyn Object> {
        Box::new(self.clone())
    }

    fn eq_object(&self, other: &dyn Object) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl Clone for Box<dyn Object> {
    fn clone(&self) -> Self {
        self.clone_object()
    }
}

impl PartialEq for Box<dyn Object> {
    fn eq(&self, other: &Self) -> bool {
        self.eq_object(other.as_ref())
    }
}

/// A self-describing value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    SByte(i8),
    Byte(u8),
    /// A single UTF-16 code unit; chars outside the BMP fail to encode.
    Char(char),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Str(String),
    Obj(Box<dyn Object>),
    List(Vec<Value>),
    Dict(Dict),
    Bools(Vec<bool>),
    SBytes(Vec<i8>),
    Bytes(Vec<u8>),
    Chars(Vec<char>),
    Shorts(Vec<i16>),
    UShorts(Vec<u16>),
    Ints(Vec<i32>),
    UInts(Vec<u32>),
    Longs(Vec<i64>),
    ULongs(Vec<u64>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
}

impl Value {
    /// Wraps an application object.
    pub fn object<T>(obj: T) -> Self
    where
        T: Serializable + Clone + PartialEq,
    {
        Value::Obj(Box::new(obj))
    }

    /// The tag this value is written with.
    pub fn tag(&self) -> Tag {
        match self {
            Value::Null => Tag::Null,
            Value::Bool(false) => Tag::False,
            Value::Bool(true) => Tag::True,
            Value::SByte(_) => Tag::SByte,
            Value::Byte(_) => Tag::Byte,
            Value::Char(_) => Tag::Char,
            Value::Short(_) => Tag::Short,
            Value::UShort(_) => Tag::UShort,
            Value::Int(_) => Tag::Int,
            Value::UInt(_) => Tag::UInt,
            Value::Long(_) => Tag::Long,
            Value::ULong(_) => Tag::ULong,
            Value::Float(_) => Tag::Float,
            Value::Double(_) => Tag::Double,
            Value::Str(s) if s.len() <= u8::MAX as usize => Tag::Str8,
            Value::Str(_) => Tag::Str16,
            Value::Obj(_) => Tag::Obj,
            Value::List(_) => Tag::List,
            Value::Dict(_) => Tag::Dict,
            Value::Bools(_) => Tag::Bools,
            Value::SBytes(_) => Tag::SBytes,
            Value::Bytes(_) => Tag::Bytes,
            Value::Chars(_) => Tag::Chars,
            Value::Shorts(_) => Tag::Shorts,
            Value::UShorts(_) => Tag::UShorts,
            Value::Ints(_) => Tag::Ints,
            Value::UInts(_) => Tag::UInts,
            Value::Longs(_) => Tag::Longs,
            Value::ULongs(_) => Tag::ULongs,
            Value::Floats(_) => Tag::Floats,
            Value::Doubles(_) => Tag::Doubles,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns any integer that fits in an `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::SByte(v) => Some(v.into()),
            Value::Byte(v) => Some(v.into()),
            Value::Short(v) => Some(v.into()),
            Value::UShort(v) => Some(v.into()),
            Value::Int(v) => Some(v.into()),
            Value::UInt(v) => Some(v.into()),
            Value::Long(v) => Some(v),
            Value::ULong(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Returns any non-negative integer that fits in a `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Byte(v) => Some(v.into()),
            Value::UShort(v) => Some(v.into()),
            Value::UInt(v) => Some(v.into()),
            Value::ULong(v) => Some(v),
            _ => self.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v.into()),
            Value::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Downcasts an object value to its concrete type.
    pub fn as_object<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Obj(obj) => obj.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn as_object_mut<T: 'static>(&mut self) -> Option<&mut T> {
        match self {
            Value::Obj(obj) => obj.as_any_mut().downcast_mut::<T>(),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => SByte,
    u8 => Byte,
    char => Char,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    u64 => ULong,
    f32 => Float,
    f64 => Double,
    String => Str,
    Vec<Value> => List,
    Dict => Dict,
    Vec<bool> => Bools,
    Vec<i8> => SBytes,
    Vec<u8> => Bytes,
    Vec<char> => Chars,
    Vec<i16> => Shorts,
    Vec<u16> => UShorts,
    Vec<i32> => Ints,
    Vec<u32> => UInts,
    Vec<i64> => Longs,
    Vec<u64> => ULongs,
    Vec<f32> => Floats,
    Vec<f64> => Doubles,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
