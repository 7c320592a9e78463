//! Object bridge between native Rust entities and an embedded script VM.
//!
//! # Overview
//!
//! Native code registers script-visible classes, pushes entities to the
//! script stack, and pulls them back with type checks:
//!
//! ```ignore
//! let mut registry = BridgeRegistry::new();
//! registry.create_class(ClassBuilder::for_type::<Body>().build())?;
//! registry.create_class(ClassBuilder::for_type::<Planet>().parent("Body").build())?;
//! registry.register_promotion("Body", "Planet", downcast_test::<Planet>())?;
//!
//! let bridge = Bridge::init(registry, BridgeConfig::default());
//! bridge.push_exclusive_as(&mut stack, &earth, "Body")?; // exposed as Planet
//! let planet = bridge.check::<Planet>(&stack, -1)?;
//! ```
//!
//! # Ownership modes
//!
//! - **Exclusive**: native code owns a [`Native<T>`]; the proxy observes it
//!   and goes dead when the entity is destroyed.
//! - **Shared**: an `Rc<RefCell<T>>`; the proxy holds one count.
//! - **Copied**: the proxy owns a clone.
//! - **Owned**: the proxy owns a value built for script use.
//!
//! Exclusive and shared proxies are deduplicated through the
//! [`IdentityMap`], so pushing the same entity twice yields the same proxy.
//!
//! # Crate layout
//!
//! - [`registry`] - classes, promotions, serializer pairs, upcasts
//! - [`bridge`] - push/pull and the identity map lifecycle
//! - [`dispatch`] - member, attribute, metamethod and property access
//! - [`persist`] - token and JSON encoding of object references

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity_map;
pub mod native_fn;
pub mod persist;
pub mod proxy;
pub mod registry;
pub mod stack;
pub mod value;

pub use bridge::{Bridge, BridgeStats, ShutdownStats};
pub use config::BridgeConfig;
pub use error::{
    BridgeError, ConversionError, Error, NotFoundReason, RegistrationError, SerializationError,
};
pub use identity_map::IdentityMap;
pub use native_fn::{CallContext, NativeCallable, NativeFn};
pub use persist::{NIL_TOKEN, TokenCursor};
pub use proxy::{Entity, ProxyId, ProxyKind, ProxyRef};
pub use registry::{
    AttrAccess, BridgeRegistry, ClassBuilder, ClassDescriptor, EntityView, MetaMethod,
    SerializerPair, downcast_test, predicate,
};
pub use stack::ScriptStack;
pub use value::{FromValue, IntoValue, Value};

pub use objbridge_core::{
    ClassHash, EntityKey, Native, Propertied, PropertyMap, PropertyValue, WeakRefFlag, Wrappable,
};

/// Commonly used types.
pub mod prelude {
    pub use crate::bridge::Bridge;
    pub use crate::config::BridgeConfig;
    pub use crate::error::{BridgeError, Error, RegistrationError, SerializationError};
    pub use crate::native_fn::CallContext;
    pub use crate::proxy::{Entity, ProxyKind, ProxyRef};
    pub use crate::registry::{
        BridgeRegistry, ClassBuilder, EntityView, MetaMethod, SerializerPair, downcast_test,
        predicate,
    };
    pub use crate::stack::ScriptStack;
    pub use crate::value::Value;
    pub use objbridge_core::{Native, Propertied, PropertyMap, Wrappable};
}
