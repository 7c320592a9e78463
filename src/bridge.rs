//! The bridge runtime: pushing entities to scripts and pulling them back.
//!
//! A [`Bridge`] owns the sealed registry and the identity map for one script
//! VM state. Every operation runs on the thread that owns that state.

use std::any::Any;
use std::cell::{BorrowError, Cell, RefCell};
use std::ops::Deref;
use std::rc::Rc;

use objbridge_core::{EntityKey, Native, Wrappable};
use tracing::{info, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, NotFoundReason};
use crate::identity_map::IdentityMap;
use crate::native_fn::CallContext;
use crate::proxy::{Entity, ErasedCell, ProxyHolder, ProxyId, ProxyRef};
use crate::registry::{BridgeRegistry, ClassDescriptor};
use crate::stack::ScriptStack;
use crate::value::Value;

/// Counters describing bridge activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Proxies created, of every kind.
    pub proxies_created: u64,
    /// Pushes answered with an existing proxy.
    pub proxies_reused: u64,
    /// Pushes whose class was promoted.
    pub promotions_applied: u64,
    /// Entries currently in the identity map.
    pub live_mappings: usize,
}

/// Summary returned by [`Bridge::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownStats {
    /// Identity map entries dropped at shutdown.
    pub released_mappings: usize,
    /// Proxies created over the bridge's lifetime.
    pub proxies_created: u64,
}

/// Object bridge for one script VM state.
pub struct Bridge {
    registry: Rc<BridgeRegistry>,
    identity: IdentityMap,
    config: BridgeConfig,
    next_proxy_id: Cell<ProxyId>,
    proxies_created: Cell<u64>,
    proxies_reused: Cell<u64>,
    promotions_applied: Cell<u64>,
}

impl Bridge {
    /// Seal a registry and start the bridge.
    pub fn init(registry: BridgeRegistry, config: BridgeConfig) -> Self {
        if config.audit_serializers {
            for gap in registry.audit_serializers() {
                warn!(
                    class = %gap.class,
                    ancestor = %gap.serializable_ancestor,
                    "class inherits from a serializable class but has no serializer of its own"
                );
            }
        }
        info!(
            classes = registry.class_count(),
            promotions = registry.promotions().len(),
            "object bridge initialised"
        );

        Self {
            identity: IdentityMap::with_capacity(config.identity_map_capacity),
            registry: Rc::new(registry),
            config,
            next_proxy_id: Cell::new(1),
            proxies_created: Cell::new(0),
            proxies_reused: Cell::new(0),
            promotions_applied: Cell::new(0),
        }
    }

    /// Start a bridge with the default configuration.
    pub fn with_defaults(registry: BridgeRegistry) -> Self {
        Self::init(registry, BridgeConfig::default())
    }

    /// Tear the bridge down, releasing every identity mapping.
    ///
    /// Proxies still held by scripts stay safe to query: exclusive ones keep
    /// observing their entity, shared ones keep their count until dropped.
    pub fn shutdown(self) -> ShutdownStats {
        let released_mappings = self.identity.clear();
        let stats = ShutdownStats {
            released_mappings,
            proxies_created: self.proxies_created.get(),
        };
        info!(
            released = stats.released_mappings,
            created = stats.proxies_created,
            "object bridge shut down"
        );
        stats
    }

    pub fn registry(&self) -> &BridgeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            proxies_created: self.proxies_created.get(),
            proxies_reused: self.proxies_reused.get(),
            promotions_applied: self.promotions_applied.get(),
            live_mappings: self.identity.len(),
        }
    }

    fn next_id(&self) -> ProxyId {
        let id = self.next_proxy_id.get();
        self.next_proxy_id.set(id + 1);
        self.proxies_created.set(self.proxies_created.get() + 1);
        id
    }

    fn reuse(&self, key: EntityKey) -> Option<ProxyRef> {
        let existing = self.identity.lookup(key)?;
        self.proxies_reused.set(self.proxies_reused.get() + 1);
        trace!(id = existing.id(), class = existing.class_name(), "reusing proxy");
        Some(existing)
    }

    /// Resolve the class an entity is exposed as, applying promotions.
    ///
    /// `borrow` is only called when the static class has promotion rules.
    fn class_for<T, R>(
        &self,
        class: &str,
        borrow: impl FnOnce() -> Result<R, BorrowError>,
    ) -> Result<Rc<ClassDescriptor>, BridgeError>
    where
        T: Any,
        R: Deref<Target = T>,
    {
        let desc = self
            .registry
            .class(class)
            .ok_or_else(|| BridgeError::UnknownClass(class.to_string()))?;
        if !self.registry.has_promotions(class) {
            return Ok(Rc::clone(desc));
        }

        let value = borrow().map_err(|_| BridgeError::EntityBorrowed {
            class: class.to_string(),
        })?;
        let entity: &dyn Any = &*value;
        let resolved =
            self.registry
                .resolve_promotion(class, entity, self.config.max_promotion_depth);
        if resolved == class {
            return Ok(Rc::clone(desc));
        }

        trace!(from = class, to = resolved, "promoted");
        self.promotions_applied
            .set(self.promotions_applied.get() + 1);
        self.registry
            .class(resolved)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownClass(resolved.to_string()))
    }

    fn run_initializer(&self, proxy: &ProxyRef) -> Result<(), BridgeError> {
        if !self.config.run_initializers {
            return Ok(());
        }
        let Some(init) = self.registry.find_initializer(proxy.class_name()) else {
            return Ok(());
        };
        let args = ScriptStack::from(vec![Value::Object(proxy.clone())]);
        let mut ctx = CallContext::new(self, args);
        init.call(&mut ctx)
    }

    // =========================================================================
    // Push
    // =========================================================================

    /// Wrap an exclusively owned entity under its static class.
    pub fn wrap_exclusive<T: Wrappable>(&self, native: &Native<T>) -> Result<ProxyRef, BridgeError> {
        self.wrap_exclusive_as(native, T::CLASS)
    }

    /// Wrap an exclusively owned entity, starting promotion from `class`.
    ///
    /// Returns the existing proxy if the entity is already mapped.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn wrap_exclusive_as<T: Wrappable>(
        &self,
        native: &Native<T>,
        class: &str,
    ) -> Result<ProxyRef, BridgeError> {
        let key = native.key();
        if let Some(existing) = self.reuse(key) {
            return Ok(existing);
        }

        let desc = self.class_for(class, || native.try_borrow())?;
        let holder = ProxyHolder::Exclusive {
            entity: native.downgrade_any(),
            alive: native.weakref_flag(),
        };
        let proxy = ProxyRef::new(self.next_id(), desc, holder, Some(key), None);
        self.identity.insert_persistent(key, proxy.clone());

        let link = self.identity.link();
        let id = proxy.id();
        if native.subscribe_deletion(move |key| link.release(key, id)) {
            warn!(
                class = proxy.class_name(),
                "replaced an existing deletion subscriber; entity was exposed through another bridge"
            );
        }
        trace!(id, class = proxy.class_name(), "new exclusive proxy");

        if let Err(err) = self.run_initializer(&proxy) {
            native.unsubscribe_deletion();
            self.identity.remove_matching(key, id);
            return Err(err);
        }
        Ok(proxy)
    }

    /// Wrap a reference-counted entity under its static class.
    pub fn wrap_shared<T: Wrappable>(
        &self,
        handle: &Rc<RefCell<T>>,
    ) -> Result<ProxyRef, BridgeError> {
        self.wrap_shared_as(handle, T::CLASS)
    }

    /// Wrap a reference-counted entity, starting promotion from `class`.
    ///
    /// The proxy holds one strong count until its last script reference drops.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn wrap_shared_as<T: Wrappable>(
        &self,
        handle: &Rc<RefCell<T>>,
        class: &str,
    ) -> Result<ProxyRef, BridgeError> {
        let key = EntityKey::shared(handle);
        if let Some(existing) = self.reuse(key) {
            return Ok(existing);
        }

        let desc = self.class_for(class, || handle.try_borrow())?;
        let cell: ErasedCell = handle.clone();
        let proxy = ProxyRef::new(
            self.next_id(),
            desc,
            ProxyHolder::Shared(cell),
            Some(key),
            Some(self.identity.link()),
        );
        self.identity.insert_transient(key, &proxy);
        trace!(id = proxy.id(), class = proxy.class_name(), "new shared proxy");

        // On failure the proxy drops here and removes its own mapping.
        self.run_initializer(&proxy)?;
        Ok(proxy)
    }

    /// Wrap an independent copy of a value.
    pub fn wrap_copied<T: Wrappable + Clone>(&self, value: &T) -> Result<ProxyRef, BridgeError> {
        let desc = self.class_for(T::CLASS, || Ok(value))?;
        let cell: ErasedCell = Rc::new(RefCell::new(value.clone()));
        let proxy = ProxyRef::new(self.next_id(), desc, ProxyHolder::Copied(cell), None, None);
        self.run_initializer(&proxy)?;
        Ok(proxy)
    }

    /// Move a freshly built value into a script-owned proxy.
    pub fn wrap_owned<T: Wrappable>(&self, value: T) -> Result<ProxyRef, BridgeError> {
        let desc = self.class_for(T::CLASS, || Ok(&value))?;
        let cell: ErasedCell = Rc::new(RefCell::new(value));
        let proxy = ProxyRef::new(self.next_id(), desc, ProxyHolder::Owned(cell), None, None);
        self.run_initializer(&proxy)?;
        Ok(proxy)
    }

    /// Push an exclusively owned entity.
    pub fn push_exclusive<T: Wrappable>(
        &self,
        stack: &mut ScriptStack,
        native: &Native<T>,
    ) -> Result<(), BridgeError> {
        stack.push(Value::Object(self.wrap_exclusive(native)?));
        Ok(())
    }

    /// Push an exclusively owned entity held through a base-class reference.
    pub fn push_exclusive_as<T: Wrappable>(
        &self,
        stack: &mut ScriptStack,
        native: &Native<T>,
        class: &str,
    ) -> Result<(), BridgeError> {
        stack.push(Value::Object(self.wrap_exclusive_as(native, class)?));
        Ok(())
    }

    /// Push a reference-counted entity.
    pub fn push_shared<T: Wrappable>(
        &self,
        stack: &mut ScriptStack,
        handle: &Rc<RefCell<T>>,
    ) -> Result<(), BridgeError> {
        stack.push(Value::Object(self.wrap_shared(handle)?));
        Ok(())
    }

    /// Push a reference-counted entity held through a base-class reference.
    pub fn push_shared_as<T: Wrappable>(
        &self,
        stack: &mut ScriptStack,
        handle: &Rc<RefCell<T>>,
        class: &str,
    ) -> Result<(), BridgeError> {
        stack.push(Value::Object(self.wrap_shared_as(handle, class)?));
        Ok(())
    }

    /// Push a copy of a value.
    pub fn push_copied<T: Wrappable + Clone>(
        &self,
        stack: &mut ScriptStack,
        value: &T,
    ) -> Result<(), BridgeError> {
        stack.push(Value::Object(self.wrap_copied(value)?));
        Ok(())
    }

    /// Create a value directly for script use and push it.
    pub fn create_in_script<T: Wrappable>(
        &self,
        stack: &mut ScriptStack,
        value: T,
    ) -> Result<(), BridgeError> {
        stack.push(Value::Object(self.wrap_owned(value)?));
        Ok(())
    }

    // =========================================================================
    // Pull
    // =========================================================================

    /// Pull the proxy at `index`, requiring `class` or a subclass of it.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn check_from_script(
        &self,
        stack: &ScriptStack,
        index: i32,
        class: &str,
    ) -> Result<ProxyRef, BridgeError> {
        if !self.registry.contains_class(class) {
            return Err(BridgeError::UnknownClass(class.to_string()));
        }
        let proxy = match stack.get(index) {
            None | Some(Value::Nil) => {
                return Err(BridgeError::NotFound {
                    index,
                    reason: NotFoundReason::Empty,
                });
            }
            Some(Value::Object(proxy)) => proxy,
            Some(other) => return Err(BridgeError::type_mismatch(class, other.type_name())),
        };
        if !proxy.is_live() {
            return Err(BridgeError::NotFound {
                index,
                reason: NotFoundReason::Deleted,
            });
        }
        if !self.registry.is_a(proxy.class_name(), class) {
            return Err(BridgeError::type_mismatch(class, proxy.class_name()));
        }
        Ok(proxy.clone())
    }

    /// Like [`check_from_script`](Self::check_from_script), but `None` on any failure.
    pub fn get_from_script(&self, stack: &ScriptStack, index: i32, class: &str) -> Option<ProxyRef> {
        self.check_from_script(stack, index, class).ok()
    }

    /// Pull a typed entity at `index`.
    pub fn check<T: Wrappable>(
        &self,
        stack: &ScriptStack,
        index: i32,
    ) -> Result<Entity<T>, BridgeError> {
        let proxy = self.check_from_script(stack, index, T::CLASS)?;
        let entity = self.entity_at::<T>(&proxy, index)?;
        // A borrow conflict is not a type error; the caller sees it on use.
        let verdict = entity.borrow().map(|_| ());
        match verdict {
            Err(err) if err.is_type_mismatch() => Err(err),
            _ => Ok(entity),
        }
    }

    /// Like [`check`](Self::check), but `None` on any failure.
    pub fn get<T: Wrappable>(&self, stack: &ScriptStack, index: i32) -> Option<Entity<T>> {
        self.check::<T>(stack, index).ok()
    }

    /// Typed access to the entity behind a proxy.
    pub fn entity<T: Wrappable>(&self, proxy: &ProxyRef) -> Result<Entity<T>, BridgeError> {
        if !proxy.is_live() {
            return Err(BridgeError::NotFound {
                index: 1,
                reason: NotFoundReason::Deleted,
            });
        }
        if !self.registry.is_a(proxy.class_name(), T::CLASS) {
            return Err(BridgeError::type_mismatch(T::CLASS, proxy.class_name()));
        }
        self.entity_at::<T>(proxy, 1)
    }

    fn entity_at<T: Wrappable>(
        &self,
        proxy: &ProxyRef,
        index: i32,
    ) -> Result<Entity<T>, BridgeError> {
        let cell = proxy.resolve().ok_or(BridgeError::NotFound {
            index,
            reason: NotFoundReason::Deleted,
        })?;
        Ok(Entity::new(
            cell,
            Rc::clone(proxy.class()),
            Rc::clone(&self.registry),
        ))
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("classes", &self.registry.class_count())
            .field("identity", &self.identity)
            .field("config", &self.config)
            .finish()
    }
}
