//! Script-side proxies for native entities.
//!
//! A proxy is what scripts hold. Its [`ProxyKind`] records how it relates to
//! the native entity:
//!
//! | Kind        | Holds                    | Identity map | Ends when                  |
//! |-------------|--------------------------|--------------|----------------------------|
//! | `Exclusive` | weak ref + liveness flag | persistent   | native entity is destroyed |
//! | `Shared`    | one strong count         | transient    | last script ref drops      |
//! | `Copied`    | an owned clone           | never        | last script ref drops      |
//! | `Owned`     | a value built for script | never        | last script ref drops      |

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use objbridge_core::{EntityKey, WeakRefFlag, Wrappable};
use tracing::trace;

use crate::error::BridgeError;
use crate::identity_map::MapLink;
use crate::registry::{BridgeRegistry, ClassDescriptor};

/// Unique id of a proxy within a bridge.
pub type ProxyId = u64;

/// Type-erased entity storage shared by proxies.
pub(crate) type ErasedCell = Rc<RefCell<dyn Any>>;

/// How a proxy relates to its native entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    /// Native code owns the entity; the proxy observes it.
    Exclusive,
    /// The entity is reference counted; the proxy holds one count.
    Shared,
    /// The proxy owns an independent clone.
    Copied,
    /// The proxy owns a value created for script use.
    Owned,
}

impl ProxyKind {
    /// Whether proxies of this kind are deduplicated through the identity map.
    pub fn is_mapped(self) -> bool {
        matches!(self, ProxyKind::Exclusive | ProxyKind::Shared)
    }
}

pub(crate) enum ProxyHolder {
    Exclusive {
        entity: Weak<RefCell<dyn Any>>,
        alive: WeakRefFlag,
    },
    Shared(ErasedCell),
    Copied(ErasedCell),
    Owned(ErasedCell),
}

impl ProxyHolder {
    fn kind(&self) -> ProxyKind {
        match self {
            ProxyHolder::Exclusive { .. } => ProxyKind::Exclusive,
            ProxyHolder::Shared(_) => ProxyKind::Shared,
            ProxyHolder::Copied(_) => ProxyKind::Copied,
            ProxyHolder::Owned(_) => ProxyKind::Owned,
        }
    }

    fn is_live(&self) -> bool {
        match self {
            ProxyHolder::Exclusive { alive, .. } => alive.is_alive(),
            _ => true,
        }
    }

    /// Strong handle to the entity, or `None` once it has been deleted.
    fn resolve(&self) -> Option<ErasedCell> {
        match self {
            ProxyHolder::Exclusive { entity, alive } => {
                if alive.is_alive() {
                    entity.upgrade()
                } else {
                    None
                }
            }
            ProxyHolder::Shared(cell) | ProxyHolder::Copied(cell) | ProxyHolder::Owned(cell) => {
                Some(Rc::clone(cell))
            }
        }
    }
}

/// The object behind a [`ProxyRef`].
pub struct ProxyObject {
    id: ProxyId,
    class: Rc<ClassDescriptor>,
    holder: ProxyHolder,
    key: Option<EntityKey>,
    /// Set for transient mappings, which the proxy removes when finalized.
    link: Option<MapLink>,
}

impl Drop for ProxyObject {
    fn drop(&mut self) {
        if let (Some(link), Some(key)) = (self.link.take(), self.key) {
            trace!(id = self.id, class = %self.class.name, "finalizing shared proxy");
            link.release(key, self.id);
        }
    }
}

/// Script reference to a proxy. Cloning shares the same proxy.
#[derive(Clone)]
pub struct ProxyRef(Rc<ProxyObject>);

impl ProxyRef {
    pub(crate) fn new(
        id: ProxyId,
        class: Rc<ClassDescriptor>,
        holder: ProxyHolder,
        key: Option<EntityKey>,
        link: Option<MapLink>,
    ) -> Self {
        ProxyRef(Rc::new(ProxyObject {
            id,
            class,
            holder,
            key,
            link,
        }))
    }

    pub(crate) fn from_rc(rc: Rc<ProxyObject>) -> Self {
        ProxyRef(rc)
    }

    pub(crate) fn downgrade(&self) -> Weak<ProxyObject> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn resolve(&self) -> Option<ErasedCell> {
        self.0.holder.resolve()
    }

    pub fn id(&self) -> ProxyId {
        self.0.id
    }

    /// Resolved (post-promotion) class name.
    pub fn class_name(&self) -> &str {
        &self.0.class.name
    }

    pub fn class(&self) -> &Rc<ClassDescriptor> {
        &self.0.class
    }

    pub fn kind(&self) -> ProxyKind {
        self.0.holder.kind()
    }

    /// Identity map key, for mapped kinds.
    pub fn entity_key(&self) -> Option<EntityKey> {
        self.0.key
    }

    /// Whether the entity is still alive. Always true except for deleted
    /// exclusive entities.
    pub fn is_live(&self) -> bool {
        self.0.holder.is_live()
    }

    /// Check if both references name the same proxy.
    pub fn same_object(&self, other: &ProxyRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live references to this proxy, including map entries.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Address used in default string renderings.
    pub fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for ProxyRef {
    fn eq(&self, other: &Self) -> bool {
        self.same_object(other)
    }
}

impl Eq for ProxyRef {}

impl fmt::Debug for ProxyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRef")
            .field("id", &self.id())
            .field("class", &self.class_name())
            .field("kind", &self.kind())
            .field("live", &self.is_live())
            .finish()
    }
}

/// Typed access to the entity behind a live proxy.
///
/// Holds a strong handle for as long as it exists, so a native deletion
/// during a call cannot free the value out from under the borrow.
pub struct Entity<T: Wrappable> {
    cell: ErasedCell,
    class: Rc<ClassDescriptor>,
    registry: Rc<BridgeRegistry>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Wrappable> Entity<T> {
    pub(crate) fn new(
        cell: ErasedCell,
        class: Rc<ClassDescriptor>,
        registry: Rc<BridgeRegistry>,
    ) -> Self {
        Self {
            cell,
            class,
            registry,
            _marker: PhantomData,
        }
    }

    /// Script class of the proxy this entity was pulled from.
    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    fn borrowed(&self) -> BridgeError {
        BridgeError::EntityBorrowed {
            class: self.class.name.clone(),
        }
    }

    fn mismatch(&self) -> BridgeError {
        BridgeError::type_mismatch(T::CLASS, self.class.name.as_str())
    }

    /// Borrow the entity as `T`.
    pub fn borrow(&self) -> Result<Ref<'_, T>, BridgeError> {
        let guard = self.cell.try_borrow().map_err(|_| self.borrowed())?;
        let upcasts = self.registry.upcasts();
        Ref::filter_map(guard, |any| upcasts.project::<T>(any)).map_err(|_| self.mismatch())
    }

    /// Mutably borrow the entity as `T`.
    pub fn borrow_mut(&self) -> Result<RefMut<'_, T>, BridgeError> {
        let guard = self.cell.try_borrow_mut().map_err(|_| self.borrowed())?;
        let upcasts = self.registry.upcasts();
        RefMut::filter_map(guard, |any| upcasts.project_mut::<T>(any))
            .map_err(|_| self.mismatch())
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, BridgeError> {
        let this = self.borrow()?;
        Ok(f(&*this))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, BridgeError> {
        let mut this = self.borrow_mut()?;
        Ok(f(&mut *this))
    }

    /// Check if two entities share the same storage.
    pub fn same_entity<U: Wrappable>(&self, other: &Entity<U>) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: Wrappable> fmt::Debug for Entity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &T::CLASS)
            .field("class", &self.class.name)
            .finish_non_exhaustive()
    }
}
