//! Core types for the object bridge.
//!
//! This crate holds the pieces that native code touches directly, without
//! depending on the script-facing runtime:
//!
//! - [`ClassHash`] - deterministic identity for script-visible class names
//! - [`Native`] - exclusive native ownership of an entity, with a stable
//!   [`EntityKey`] and a single-subscriber deletion channel
//! - [`PropertyMap`] - free-form key/value storage for propertied entities

mod class_hash;
mod entity;
mod property;

pub use class_hash::{ClassHash, hash_constants};
pub use entity::{EntityKey, Native, Wrappable, WeakRefFlag};
pub use property::{Propertied, PropertyMap, PropertyValue};
