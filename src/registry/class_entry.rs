//! Class descriptor.
//!
//! A [`ClassDescriptor`] holds the static, script-visible metadata for one
//! class: its parent, methods, attributes, metamethods, and optional property
//! map accessor. Descriptors are built once at start-up with
//! [`ClassBuilder`](super::ClassBuilder) and never change afterwards.

use std::any::Any;
use std::fmt;

use bitflags::bitflags;
use objbridge_core::{ClassHash, Propertied, PropertyMap};
use rustc_hash::FxHashMap;

use crate::native_fn::NativeFn;

bitflags! {
    /// Access allowed on an attribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttrAccess: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// A script-visible attribute backed by native getter/setter functions.
///
/// The getter receives the receiver at index 1 and pushes one result. The
/// setter receives the receiver at index 1 and the new value at index 2.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub getter: NativeFn,
    pub setter: Option<NativeFn>,
}

impl Attribute {
    pub fn access(&self) -> AttrAccess {
        match self.setter {
            Some(_) => AttrAccess::READ_WRITE,
            None => AttrAccess::READ,
        }
    }
}

/// Metamethods a class may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaMethod {
    ToString,
    Eq,
    Lt,
    Le,
    Len,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Unm,
    Call,
}

impl MetaMethod {
    pub const ALL: [MetaMethod; 12] = [
        MetaMethod::ToString,
        MetaMethod::Eq,
        MetaMethod::Lt,
        MetaMethod::Le,
        MetaMethod::Len,
        MetaMethod::Concat,
        MetaMethod::Add,
        MetaMethod::Sub,
        MetaMethod::Mul,
        MetaMethod::Div,
        MetaMethod::Unm,
        MetaMethod::Call,
    ];

    /// Script-visible name of this metamethod.
    pub fn name(self) -> &'static str {
        match self {
            MetaMethod::ToString => "__tostring",
            MetaMethod::Eq => "__eq",
            MetaMethod::Lt => "__lt",
            MetaMethod::Le => "__le",
            MetaMethod::Len => "__len",
            MetaMethod::Concat => "__concat",
            MetaMethod::Add => "__add",
            MetaMethod::Sub => "__sub",
            MetaMethod::Mul => "__mul",
            MetaMethod::Div => "__div",
            MetaMethod::Unm => "__unm",
            MetaMethod::Call => "__call",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for MetaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accessors for an entity's [`PropertyMap`].
#[derive(Clone, Copy)]
pub struct PropertyAccess {
    pub get: fn(&dyn Any) -> Option<&PropertyMap>,
    pub get_mut: fn(&mut dyn Any) -> Option<&mut PropertyMap>,
}

impl PropertyAccess {
    /// Accessors for entities of concrete type `T`.
    pub fn of<T: Propertied + Any>() -> Self {
        Self {
            get: properties_of::<T>,
            get_mut: properties_of_mut::<T>,
        }
    }
}

impl fmt::Debug for PropertyAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccess").finish_non_exhaustive()
    }
}

fn properties_of<T: Propertied + Any>(any: &dyn Any) -> Option<&PropertyMap> {
    any.downcast_ref::<T>().map(T::properties)
}

fn properties_of_mut<T: Propertied + Any>(any: &mut dyn Any) -> Option<&mut PropertyMap> {
    any.downcast_mut::<T>().map(T::properties_mut)
}

/// Registry entry for a script-visible class.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    /// Class name.
    pub name: String,
    /// Hash of the class name.
    pub hash: ClassHash,
    /// Parent class name (single inheritance).
    pub parent: Option<String>,

    // === Members ===
    /// Methods by name.
    pub methods: FxHashMap<String, NativeFn>,
    /// Attributes by name.
    pub attributes: FxHashMap<String, Attribute>,
    /// Metamethods.
    pub meta: FxHashMap<MetaMethod, NativeFn>,

    // === Lifecycle ===
    /// Property map accessor for propertied entities.
    pub properties: Option<PropertyAccess>,
    /// Runs once when a proxy of this class is first registered.
    pub initializer: Option<NativeFn>,
}

impl ClassDescriptor {
    /// Create an empty class descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            hash: ClassHash::from_name(&name),
            name,
            parent: None,
            methods: FxHashMap::default(),
            attributes: FxHashMap::default(),
            meta: FxHashMap::default(),
            properties: None,
            initializer: None,
        }
    }

    /// Find a method declared directly on this class.
    pub fn find_method(&self, name: &str) -> Option<&NativeFn> {
        self.methods.get(name)
    }

    /// Find an attribute declared directly on this class.
    pub fn find_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Find a metamethod declared directly on this class.
    pub fn find_meta(&self, meta: MetaMethod) -> Option<&NativeFn> {
        self.meta.get(&meta)
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }
}
