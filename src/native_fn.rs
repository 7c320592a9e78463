//! Native function storage and call context.
//!
//! Methods, attribute accessors, metamethods, and initializers are all stored
//! as [`NativeFn`]. Each call receives a [`CallContext`] holding the argument
//! stack (receiver at index 1) and a result stack.

use std::fmt;
use std::rc::Rc;

use objbridge_core::{ClassHash, Native, Wrappable};

use crate::bridge::Bridge;
use crate::error::{BridgeError, NotFoundReason};
use crate::proxy::{Entity, ProxyRef};
use crate::stack::ScriptStack;
use crate::value::{FromValue, IntoValue, Value};

/// Type-erased native function.
///
/// The callable is shared through an `Rc`, so cloning a `NativeFn` is cheap.
pub struct NativeFn {
    /// Member hash assigned at registration.
    pub id: ClassHash,
    inner: Rc<dyn NativeCallable>,
}

impl NativeFn {
    /// Create a new NativeFn from a closure.
    pub fn new<F>(id: ClassHash, f: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<(), BridgeError> + 'static,
    {
        Self {
            id,
            inner: Rc::new(f),
        }
    }

    /// Create a NativeFn from any [`NativeCallable`].
    pub fn from_callable<C: NativeCallable + 'static>(id: ClassHash, callable: C) -> Self {
        Self {
            id,
            inner: Rc::new(callable),
        }
    }

    /// Call this native function with the given context.
    pub fn call(&self, ctx: &mut CallContext<'_>) -> Result<(), BridgeError> {
        self.inner.call(ctx)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Clone for NativeFn {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Trait for callable native functions.
pub trait NativeCallable {
    /// Call this function with the given context.
    fn call(&self, ctx: &mut CallContext<'_>) -> Result<(), BridgeError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut CallContext<'_>) -> Result<(), BridgeError>,
{
    fn call(&self, ctx: &mut CallContext<'_>) -> Result<(), BridgeError> {
        (self)(ctx)
    }
}

/// Execution context for a native call.
///
/// Argument indices follow stack conventions: the receiver is at index 1 and
/// script arguments follow it. Indices past the end read as nil.
pub struct CallContext<'b> {
    bridge: &'b Bridge,
    args: ScriptStack,
    results: ScriptStack,
}

impl<'b> CallContext<'b> {
    pub(crate) fn new(bridge: &'b Bridge, args: ScriptStack) -> Self {
        Self {
            bridge,
            args,
            results: ScriptStack::new(),
        }
    }

    /// The bridge this call runs under.
    pub fn bridge(&self) -> &'b Bridge {
        self.bridge
    }

    pub fn args(&self) -> &ScriptStack {
        &self.args
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Raw argument value.
    pub fn get(&self, index: i32) -> Option<&Value> {
        self.args.get(index)
    }

    /// Convert an argument. Missing arguments convert from nil.
    pub fn arg<T: FromValue>(&self, index: i32) -> Result<T, BridgeError> {
        let value = self.args.get(index).unwrap_or(&Value::Nil);
        Ok(T::from_value(value)?)
    }

    /// The receiver proxy at index 1.
    pub fn receiver(&self) -> Result<ProxyRef, BridgeError> {
        match self.args.get(1) {
            Some(Value::Object(proxy)) => Ok(proxy.clone()),
            Some(Value::Nil) | None => Err(BridgeError::NotFound {
                index: 1,
                reason: NotFoundReason::Empty,
            }),
            Some(other) => Err(BridgeError::type_mismatch("userdata", other.type_name())),
        }
    }

    /// The receiver as a typed entity.
    pub fn this<T: Wrappable>(&self) -> Result<Entity<T>, BridgeError> {
        self.bridge.check::<T>(&self.args, 1)
    }

    /// A typed entity argument.
    pub fn check<T: Wrappable>(&self, index: i32) -> Result<Entity<T>, BridgeError> {
        self.bridge.check::<T>(&self.args, index)
    }

    /// A typed entity argument, or `None` if absent or unusable.
    pub fn get_entity<T: Wrappable>(&self, index: i32) -> Option<Entity<T>> {
        self.bridge.get::<T>(&self.args, index)
    }

    /// A proxy argument of the given class or one of its subclasses.
    pub fn check_proxy(&self, index: i32, class: &str) -> Result<ProxyRef, BridgeError> {
        self.bridge.check_from_script(&self.args, index, class)
    }

    // === Results ===

    /// Push a return value.
    pub fn ret<T: IntoValue>(&mut self, value: T) {
        self.results.push(value.into_value());
    }

    pub fn results(&self) -> &ScriptStack {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut ScriptStack {
        &mut self.results
    }

    /// Return an exclusively owned entity.
    pub fn ret_exclusive<T: Wrappable>(&mut self, native: &Native<T>) -> Result<(), BridgeError> {
        self.bridge.push_exclusive(&mut self.results, native)
    }

    /// Return a reference-counted entity.
    pub fn ret_shared<T: Wrappable>(
        &mut self,
        handle: &Rc<std::cell::RefCell<T>>,
    ) -> Result<(), BridgeError> {
        self.bridge.push_shared(&mut self.results, handle)
    }

    /// Return a copy of a value.
    pub fn ret_copied<T: Wrappable + Clone>(&mut self, value: &T) -> Result<(), BridgeError> {
        self.bridge.push_copied(&mut self.results, value)
    }

    pub(crate) fn into_results(self) -> Vec<Value> {
        self.results.into_vec()
    }
}
