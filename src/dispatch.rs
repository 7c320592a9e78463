//! Script-facing member dispatch.
//!
//! Every class answers a small set of built-in members ahead of its own
//! method table:
//!
//! | Member      | Arguments       | Result                              |
//! |-------------|-----------------|-------------------------------------|
//! | `exists`    |                 | whether the entity is still live    |
//! | `isa`       | class name      | ancestry check                      |
//! | `setprop`   | name, value     | set (or unset, for nil) a property  |
//! | `unsetprop` | name            | remove a property                   |
//! | `hasprop`   | name            | whether a property is set           |
//!
//! Everything else walks the descriptor chain from the proxy's resolved
//! class to its root.

use objbridge_core::{PropertyMap, PropertyValue};
use tracing::trace;

use crate::bridge::Bridge;
use crate::error::{BridgeError, ConversionError, NotFoundReason};
use crate::native_fn::{CallContext, NativeFn};
use crate::proxy::ProxyRef;
use crate::registry::MetaMethod;
use crate::stack::ScriptStack;
use crate::value::Value;

const BUILTIN_EXISTS: &str = "exists";
const BUILTIN_ISA: &str = "isa";
const BUILTIN_SETPROP: &str = "setprop";
const BUILTIN_UNSETPROP: &str = "unsetprop";
const BUILTIN_HASPROP: &str = "hasprop";

fn receiver_of(value: &Value) -> Result<&ProxyRef, BridgeError> {
    match value {
        Value::Object(proxy) => Ok(proxy),
        Value::Nil => Err(BridgeError::NotFound {
            index: 1,
            reason: NotFoundReason::Empty,
        }),
        other => Err(BridgeError::type_mismatch("userdata", other.type_name())),
    }
}

fn require_live(proxy: &ProxyRef) -> Result<(), BridgeError> {
    if proxy.is_live() {
        Ok(())
    } else {
        Err(BridgeError::NotFound {
            index: 1,
            reason: NotFoundReason::Deleted,
        })
    }
}

fn property_name(args: &[Value]) -> Result<String, BridgeError> {
    match args.first() {
        Some(Value::String(name)) => Ok(name.clone()),
        Some(other) => Err(ConversionError::TypeMismatch {
            expected: "string",
            actual: other.type_name(),
        }
        .into()),
        None => Err(ConversionError::TypeMismatch {
            expected: "string",
            actual: "nil",
        }
        .into()),
    }
}

/// Largest integer magnitude a property number stores exactly (2^53).
const MAX_EXACT_INT: u64 = 1 << 53;

fn property_value(value: &Value) -> Result<Option<PropertyValue>, ConversionError> {
    match value {
        Value::Nil => Ok(None),
        Value::Int(i) if i.unsigned_abs() <= MAX_EXACT_INT => {
            Ok(Some(PropertyValue::Number(*i as f64)))
        }
        Value::Int(i) => Err(ConversionError::IntegerOverflow {
            value: *i,
            target_type: "number",
        }),
        Value::Number(n) => Ok(Some(PropertyValue::Number(*n))),
        Value::String(s) => Ok(Some(PropertyValue::String(s.clone()))),
        other => Err(ConversionError::TypeMismatch {
            expected: "number or string",
            actual: other.type_name(),
        }),
    }
}

impl Bridge {
    fn invoke(
        &self,
        func: &NativeFn,
        proxy: &ProxyRef,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, BridgeError> {
        let mut stack = ScriptStack::with_capacity(args.len() + 1);
        stack.push(Value::Object(proxy.clone()));
        stack.extend(args);
        let mut ctx = CallContext::new(self, stack);
        func.call(&mut ctx)?;
        Ok(ctx.into_results())
    }

    /// Call a member on a script value.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_method(
        &self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, BridgeError> {
        let proxy = receiver_of(receiver)?;
        match name {
            BUILTIN_EXISTS => return Ok(vec![Value::Bool(proxy.is_live())]),
            BUILTIN_ISA => {
                let class = property_name(&args)?;
                return Ok(vec![Value::Bool(self.is_a(receiver, &class)?)]);
            }
            BUILTIN_SETPROP => {
                let prop = property_name(&args)?;
                let value = args.get(1).cloned().unwrap_or_default();
                self.set_property(receiver, &prop, value)?;
                return Ok(Vec::new());
            }
            BUILTIN_UNSETPROP => {
                let prop = property_name(&args)?;
                self.unset_property(receiver, &prop)?;
                return Ok(Vec::new());
            }
            BUILTIN_HASPROP => {
                let prop = property_name(&args)?;
                return Ok(vec![Value::Bool(self.has_property(receiver, &prop)?)]);
            }
            _ => {}
        }

        let func = self
            .registry()
            .find_method(proxy.class_name(), name)
            .ok_or_else(|| BridgeError::NoSuchMember {
                class: proxy.class_name().to_string(),
                member: name.to_string(),
            })?;
        require_live(proxy)?;
        trace!(class = proxy.class_name(), method = name, "dispatch");
        self.invoke(func, proxy, args)
    }

    /// Read an attribute. A getter that returns nothing reads as nil.
    pub fn get_attribute(&self, receiver: &Value, name: &str) -> Result<Value, BridgeError> {
        let proxy = receiver_of(receiver)?;
        let attr = self
            .registry()
            .find_attribute(proxy.class_name(), name)
            .ok_or_else(|| BridgeError::NoSuchMember {
                class: proxy.class_name().to_string(),
                member: name.to_string(),
            })?;
        require_live(proxy)?;
        let results = self.invoke(&attr.getter, proxy, Vec::new())?;
        Ok(results.into_iter().next().unwrap_or_default())
    }

    /// Write an attribute.
    pub fn set_attribute(
        &self,
        receiver: &Value,
        name: &str,
        value: Value,
    ) -> Result<(), BridgeError> {
        let proxy = receiver_of(receiver)?;
        let attr = self
            .registry()
            .find_attribute(proxy.class_name(), name)
            .ok_or_else(|| BridgeError::NoSuchMember {
                class: proxy.class_name().to_string(),
                member: name.to_string(),
            })?;
        let setter = attr
            .setter
            .as_ref()
            .ok_or_else(|| BridgeError::ReadOnlyAttribute {
                class: proxy.class_name().to_string(),
                attribute: name.to_string(),
            })?;
        require_live(proxy)?;
        self.invoke(setter, proxy, vec![value])?;
        Ok(())
    }

    /// Call a metamethod.
    pub fn call_meta(
        &self,
        receiver: &Value,
        meta: MetaMethod,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, BridgeError> {
        let proxy = receiver_of(receiver)?;
        let func = self
            .registry()
            .find_meta(proxy.class_name(), meta)
            .ok_or_else(|| BridgeError::NoSuchMember {
                class: proxy.class_name().to_string(),
                member: meta.name().to_string(),
            })?;
        require_live(proxy)?;
        self.invoke(func, proxy, args)
    }

    /// Render a value the way the script's `tostring` would.
    ///
    /// Objects use their `__tostring` metamethod when one is registered and
    /// the entity is live; otherwise `userdata [<class>]: 0x<address>`.
    pub fn display_string(&self, value: &Value) -> Result<String, BridgeError> {
        let proxy = match value {
            Value::Object(proxy) => proxy,
            Value::Nil => return Ok("nil".to_string()),
            Value::Bool(b) => return Ok(b.to_string()),
            Value::Int(i) => return Ok(i.to_string()),
            Value::Number(n) => return Ok(n.to_string()),
            Value::String(s) => return Ok(s.clone()),
        };

        let has_meta = self
            .registry()
            .find_meta(proxy.class_name(), MetaMethod::ToString)
            .is_some();
        if has_meta && proxy.is_live() {
            let results = self.call_meta(value, MetaMethod::ToString, Vec::new())?;
            return match results.into_iter().next() {
                Some(Value::String(s)) => Ok(s),
                Some(other) => Err(ConversionError::TypeMismatch {
                    expected: "string",
                    actual: other.type_name(),
                }
                .into()),
                None => Err(ConversionError::TypeMismatch {
                    expected: "string",
                    actual: "nil",
                }
                .into()),
            };
        }
        Ok(format!(
            "userdata [{}]: {:#x}",
            proxy.class_name(),
            proxy.address()
        ))
    }

    /// Whether `value` is an object whose entity is still live.
    pub fn exists(&self, value: &Value) -> bool {
        value.as_object().is_some_and(ProxyRef::is_live)
    }

    /// Check if `value` is an instance of `class` or one of its subclasses.
    pub fn is_a(&self, value: &Value, class: &str) -> Result<bool, BridgeError> {
        let proxy = receiver_of(value)?;
        require_live(proxy)?;
        Ok(self.registry().is_a(proxy.class_name(), class))
    }

    // === Property maps ===

    fn with_property_map<R>(
        &self,
        value: &Value,
        f: impl FnOnce(&PropertyMap) -> R,
    ) -> Result<R, BridgeError> {
        let proxy = receiver_of(value)?;
        let cell = proxy.resolve().ok_or(BridgeError::NotFound {
            index: 1,
            reason: NotFoundReason::Deleted,
        })?;
        let guard = cell.try_borrow().map_err(|_| BridgeError::EntityBorrowed {
            class: proxy.class_name().to_string(),
        })?;
        let map = self
            .registry()
            .property_accessors(proxy.class_name())
            .find_map(|access| (access.get)(&*guard))
            .ok_or_else(|| BridgeError::NoPropertyMap {
                class: proxy.class_name().to_string(),
            })?;
        Ok(f(map))
    }

    fn with_property_map_mut<R>(
        &self,
        value: &Value,
        f: impl FnOnce(&mut PropertyMap) -> R,
    ) -> Result<R, BridgeError> {
        let proxy = receiver_of(value)?;
        let cell = proxy.resolve().ok_or(BridgeError::NotFound {
            index: 1,
            reason: NotFoundReason::Deleted,
        })?;
        let mut guard = cell
            .try_borrow_mut()
            .map_err(|_| BridgeError::EntityBorrowed {
                class: proxy.class_name().to_string(),
            })?;
        let access = self
            .registry()
            .property_accessors(proxy.class_name())
            .find(|access| (access.get)(&*guard).is_some())
            .ok_or_else(|| BridgeError::NoPropertyMap {
                class: proxy.class_name().to_string(),
            })?;
        let map = (access.get_mut)(&mut *guard).ok_or_else(|| BridgeError::NoPropertyMap {
            class: proxy.class_name().to_string(),
        })?;
        Ok(f(map))
    }

    /// Set a named property. Nil removes it.
    pub fn set_property(&self, value: &Value, name: &str, prop: Value) -> Result<(), BridgeError> {
        let prop = property_value(&prop)?;
        self.with_property_map_mut(value, |map| match prop {
            Some(prop) => {
                map.set(name, prop);
            }
            None => {
                map.unset(name);
            }
        })
    }

    /// Remove a named property, returning whether it was set.
    pub fn unset_property(&self, value: &Value, name: &str) -> Result<bool, BridgeError> {
        self.with_property_map_mut(value, |map| map.unset(name).is_some())
    }

    pub fn has_property(&self, value: &Value, name: &str) -> Result<bool, BridgeError> {
        self.with_property_map(value, |map| map.contains(name))
    }

    /// Read a named property; unset properties read as nil.
    pub fn get_property(&self, value: &Value, name: &str) -> Result<Value, BridgeError> {
        self.with_property_map(value, |map| match map.get(name) {
            Some(PropertyValue::Number(n)) => Value::Number(*n),
            Some(PropertyValue::String(s)) => Value::String(s.clone()),
            None => Value::Nil,
        })
    }
}
