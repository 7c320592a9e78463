//! ClassBuilder for declaring script-visible classes.
//!
//! # Example
//!
//! ```ignore
//! registry.create_class(
//!     ClassBuilder::new("Ship")
//!         .parent("ModelBody")
//!         .method_ref("GetLabel", |ship: &Ship| ship.label.clone())
//!         .attribute_rw("hull", |ship: &Ship| ship.hull, |ship: &mut Ship, v: u32| ship.hull = v)
//!         .meta(MetaMethod::ToString, |ctx| {
//!             let label = ctx.this::<Ship>()?.with(|s| s.label.clone())?;
//!             ctx.ret(format!("Ship({label})"));
//!             Ok(())
//!         })
//!         .with_properties::<Ship>()
//!         .build(),
//! )?;
//! ```

use std::any::Any;

use objbridge_core::{ClassHash, Propertied, Wrappable};

use super::class_entry::{Attribute, ClassDescriptor, MetaMethod, PropertyAccess};
use crate::error::BridgeError;
use crate::native_fn::{CallContext, NativeFn};
use crate::value::{FromValue, IntoValue};

/// Fluent builder for a [`ClassDescriptor`].
pub struct ClassBuilder {
    desc: ClassDescriptor,
}

impl ClassBuilder {
    /// Start a class with no parent and no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            desc: ClassDescriptor::new(name),
        }
    }

    /// Start a class named after a wrappable type.
    pub fn for_type<T: Wrappable>() -> Self {
        Self::new(T::CLASS)
    }

    /// Set the parent class. The parent must be registered first.
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.desc.parent = Some(parent.into());
        self
    }

    fn member_id(&self, name: &str) -> ClassHash {
        ClassHash::from_member(self.desc.hash, name)
    }

    // === Methods ===

    /// Register a method.
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<(), BridgeError> + 'static,
    {
        let name = name.into();
        let func = NativeFn::new(self.member_id(&name), f);
        self.desc.methods.insert(name, func);
        self
    }

    /// Register a method that reads the receiver and returns one value.
    pub fn method_ref<T, R, F>(self, name: impl Into<String>, f: F) -> Self
    where
        T: Wrappable,
        R: IntoValue,
        F: Fn(&T) -> R + 'static,
    {
        self.method(name, move |ctx| {
            let value = ctx.this::<T>()?.with(&f)?;
            ctx.ret(value);
            Ok(())
        })
    }

    // === Attributes ===

    /// Register a read-only attribute.
    pub fn attribute_get<G>(mut self, name: impl Into<String>, getter: G) -> Self
    where
        G: Fn(&mut CallContext<'_>) -> Result<(), BridgeError> + 'static,
    {
        let name = name.into();
        let attr = Attribute {
            getter: NativeFn::new(self.member_id(&name), getter),
            setter: None,
            name: name.clone(),
        };
        self.desc.attributes.insert(name, attr);
        self
    }

    /// Register a read-write attribute.
    pub fn attribute<G, S>(mut self, name: impl Into<String>, getter: G, setter: S) -> Self
    where
        G: Fn(&mut CallContext<'_>) -> Result<(), BridgeError> + 'static,
        S: Fn(&mut CallContext<'_>) -> Result<(), BridgeError> + 'static,
    {
        let name = name.into();
        let id = self.member_id(&name);
        let attr = Attribute {
            getter: NativeFn::new(id, getter),
            setter: Some(NativeFn::new(id, setter)),
            name: name.clone(),
        };
        self.desc.attributes.insert(name, attr);
        self
    }

    /// Register a read-only attribute computed from the receiver.
    pub fn attribute_ref<T, R, G>(self, name: impl Into<String>, get: G) -> Self
    where
        T: Wrappable,
        R: IntoValue,
        G: Fn(&T) -> R + 'static,
    {
        self.attribute_get(name, move |ctx| {
            let value = ctx.this::<T>()?.with(&get)?;
            ctx.ret(value);
            Ok(())
        })
    }

    /// Register a read-write attribute backed by receiver accessors.
    pub fn attribute_rw<T, R, A, G, S>(self, name: impl Into<String>, get: G, set: S) -> Self
    where
        T: Wrappable,
        R: IntoValue,
        A: FromValue,
        G: Fn(&T) -> R + 'static,
        S: Fn(&mut T, A) + 'static,
    {
        self.attribute(
            name,
            move |ctx| {
                let value = ctx.this::<T>()?.with(&get)?;
                ctx.ret(value);
                Ok(())
            },
            move |ctx| {
                let value: A = ctx.arg(2)?;
                ctx.this::<T>()?.with_mut(|this| set(this, value))
            },
        )
    }

    // === Metamethods and lifecycle ===

    /// Register a metamethod.
    pub fn meta<F>(mut self, meta: MetaMethod, f: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<(), BridgeError> + 'static,
    {
        let func = NativeFn::new(self.member_id(meta.name()), f);
        self.desc.meta.insert(meta, func);
        self
    }

    /// Expose the entity's property map through `setprop`/`unsetprop`/`hasprop`.
    pub fn with_properties<T: Propertied + Any>(mut self) -> Self {
        self.desc.properties = Some(PropertyAccess::of::<T>());
        self
    }

    /// Run `f` once when a proxy of this class is first registered.
    pub fn initializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<(), BridgeError> + 'static,
    {
        self.desc.initializer = Some(NativeFn::new(self.member_id("__init"), f));
        self
    }

    /// Finish building.
    pub fn build(self) -> ClassDescriptor {
        self.desc
    }
}
