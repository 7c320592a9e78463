//! Serializer pairs for persisting object references.
//!
//! Each serializable class registers an `(encode, decode)` pair. `encode`
//! turns a live entity into a single-line payload, typically an index into a
//! container that the save file rebuilds on load. `decode` turns a payload
//! back into a script value once that container exists again.
//!
//! Pairs are looked up by exact class. A subclass that should persist like
//! its parent registers the same pair under its own name.

use std::any::{Any, type_name};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::upcast::UpcastTable;
use crate::bridge::Bridge;
use crate::error::{BridgeError, SerializationError};
use crate::value::Value;

/// Read-only view of an entity handed to encoders.
pub struct EntityView<'a> {
    class: &'a str,
    value: &'a dyn Any,
    upcasts: &'a UpcastTable,
}

impl<'a> EntityView<'a> {
    pub(crate) fn new(class: &'a str, value: &'a dyn Any, upcasts: &'a UpcastTable) -> Self {
        Self {
            class,
            value,
            upcasts,
        }
    }

    /// Script class the entity is exposed as.
    pub fn class_name(&self) -> &'a str {
        self.class
    }

    /// View the entity as `T`, directly or through a registered upcast.
    pub fn downcast<T: Any>(&self) -> Option<&'a T> {
        self.upcasts.project::<T>(self.value)
    }

    pub fn as_any(&self) -> &'a dyn Any {
        self.value
    }
}

pub type EncodeFn = Rc<dyn Fn(&EntityView<'_>) -> Result<String, SerializationError>>;
pub type DecodeFn = Rc<dyn Fn(&Bridge, &str) -> Result<Value, SerializationError>>;

/// An encode/decode pair for one class.
#[derive(Clone)]
pub struct SerializerPair {
    pub encode: EncodeFn,
    pub decode: DecodeFn,
}

impl SerializerPair {
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&EntityView<'_>) -> Result<String, SerializationError> + 'static,
        D: Fn(&Bridge, &str) -> Result<Value, SerializationError> + 'static,
    {
        Self {
            encode: Rc::new(encode),
            decode: Rc::new(decode),
        }
    }

    /// Pair whose encoder works on a typed view of the entity.
    ///
    /// ```ignore
    /// let pair = SerializerPair::typed(
    ///     |body: &Body| Ok(body.index.to_string()),
    ///     |bridge, payload| decode_body(bridge, payload),
    /// );
    /// ```
    pub fn typed<T, E, D>(encode: E, decode: D) -> Self
    where
        T: Any,
        E: Fn(&T) -> Result<String, SerializationError> + 'static,
        D: Fn(&Bridge, &str) -> Result<Value, SerializationError> + 'static,
    {
        Self::new(
            move |view: &EntityView<'_>| match view.downcast::<T>() {
                Some(value) => encode(value),
                None => Err(BridgeError::type_mismatch(type_name::<T>(), view.class_name()).into()),
            },
            decode,
        )
    }
}

impl fmt::Debug for SerializerPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerPair").finish_non_exhaustive()
    }
}

/// Serializer pairs by exact class name.
#[derive(Debug, Default)]
pub struct SerializerTable {
    pairs: FxHashMap<String, SerializerPair>,
}

impl SerializerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair. Returns `false` if the class already has one.
    pub fn insert(&mut self, class: &str, pair: SerializerPair) -> bool {
        if self.pairs.contains_key(class) {
            return false;
        }
        self.pairs.insert(class.to_string(), pair);
        true
    }

    pub fn get(&self, class: &str) -> Option<&SerializerPair> {
        self.pairs.get(class)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.pairs.contains_key(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
