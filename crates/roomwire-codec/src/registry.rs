//! Class-id registry for application object types.

use std::any::TypeId;
use std::collections::BTreeMap;

use crate::{CodecError, Object, Serializable};

struct Entry {
    type_id: TypeId,
    type_name: &'static str,
    construct: fn() -> Box<dyn Object>,
}

/// Maps single-byte class ids to application types and back.
///
/// Build one at startup, register every type the room exchanges, then
/// share it (behind an `Arc`) with every reader and writer. Both sides of a
/// connection must agree on the ids.
///
/// ```rust
/// use roomwire_codec::{CodecError, Reader, Registry, Serializable, Writer};
///
/// #[derive(Debug, Clone, PartialEq, Default)]
/// struct Score(u32);
///
/// impl Serializable for Score {
///     fn serialize(&self, w: &mut Writer<'_>) -> Result<(), CodecError> {
///         w.write_uint(self.0);
///         Ok(())
///     }
///     fn deserialize(&mut self, r: &mut Reader<'_>) -> Result<(), CodecError> {
///         self.0 = r.read_uint()?;
///         Ok(())
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.register::<Score>(1).unwrap();
/// assert!(registry.register::<Score>(2).is_err());
/// ```
#[derive(Default)]
pub struct Registry {
    by_class: BTreeMap<u8, Entry>,
    by_type: BTreeMap<TypeId, u8>,
}

static EMPTY: Registry = Registry::new();

fn construct_default<T>() -> Box<dyn Object>
where
    T: Serializable + Clone + PartialEq + Default,
{
    Box::new(T::default())
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            by_class: BTreeMap::new(),
            by_type: BTreeMap::new(),
        }
    }

    /// A registry with no types, for frames that never carry objects.
    pub fn empty() -> &'static Registry {
        &EMPTY
    }

    /// Registers `T` under `class_id`.
    ///
    /// # Errors
    /// [`CodecError::DuplicateClassId`] if the id is taken,
    /// [`CodecError::DuplicateType`] if `T` is already registered.
    pub fn register<T>(&mut self, class_id: u8) -> Result<(), CodecError>
    where
        T: Serializable + Clone + PartialEq + Default,
    {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();
        if self.by_type.contains_key(&type_id) {
            return Err(CodecError::DuplicateType(type_name));
        }
        if self.by_class.contains_key(&class_id) {
            return Err(CodecError::DuplicateClassId(class_id));
        }
        self.by_class.insert(
            class_id,
            Entry {
                type_id,
                type_name,
                construct: construct_default::<T>,
            },
        );
        self.by_type.insert(type_id, class_id);
        Ok(())
    }

    /// Looks up the class id for a concrete type.
    pub fn class_id_of(&self, type_id: TypeId) -> Option<u8> {
        self.by_type.get(&type_id).copied()
    }

    /// The class id `T` was registered under.
    pub fn class_id<T: 'static>(&self) -> Option<u8> {
        self.class_id_of(TypeId::of::<T>())
    }

    /// Returns `true` if `class_id` belongs to `type_id`.
    pub(crate) fn is_class_of(&self, class_id: u8, type_id: TypeId) -> bool {
        self.by_class
            .get(&class_id)
            .is_some_and(|e| e.type_id == type_id)
    }

    /// Creates a default instance of the type behind `class_id`.
    pub(crate) fn construct(&self, class_id: u8) -> Result<Box<dyn Object>, CodecError> {
        self.by_class
            .get(&class_id)
            .map(|e| (e.construct)())
            .ok_or(CodecError::UnregisteredClass(class_id))
    }

    pub(crate) fn type_name(&self, class_id: u8) -> Option<&'static str> {
        self.by_class.get(&class_id).map(|e| e.type_name)
    }

    pub fn len(&self) -> usize {
        self.by_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.by_class.iter().map(|(id, e)| (id, e.type_name)))
            .finish()
    }
}
