//! Exclusive native ownership of script-visible entities.
//!
//! A [`Native<T>`] is the sole owner of an entity. Scripts never own it; they
//! observe it through proxies that hold a weak reference plus a shared
//! [`WeakRefFlag`]. Dropping the `Native` flips the flag and fires the one
//! registered deletion subscriber before the value itself is released.

use std::any::Any;
use std::cell::{BorrowError, BorrowMutError, Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Capability tag for types that may be exposed to scripts.
///
/// `CLASS` is the script-visible class name of the static type. Promotion may
/// later pick a more derived class for a particular value.
pub trait Wrappable: Any {
    /// Script-visible class name.
    const CLASS: &'static str;
}

/// Generations handed out to exclusive entities. Zero is reserved for
/// reference-counted allocations, which cannot be freed while mapped.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identity of a native entity: its address plus a generation.
///
/// The generation keeps a new entity that reuses a freed address from
/// aliasing a stale identity map entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityKey {
    /// Address of the entity's allocation.
    pub addr: usize,
    /// Allocation generation (0 for reference-counted handles).
    pub generation: u64,
}

impl EntityKey {
    /// Key for an exclusively owned allocation; takes a fresh generation.
    pub fn exclusive<T: ?Sized>(rc: &Rc<T>) -> Self {
        Self {
            addr: Rc::as_ptr(rc) as *const () as usize,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Key for a reference-counted allocation shared with scripts.
    pub fn shared<T: ?Sized>(rc: &Rc<T>) -> Self {
        Self {
            addr: Rc::as_ptr(rc) as *const () as usize,
            generation: 0,
        }
    }

    /// Check if this key names a reference-counted allocation.
    pub fn is_shared(&self) -> bool {
        self.generation == 0
    }
}

/// Liveness flag shared between an entity and every proxy observing it.
#[derive(Clone)]
pub struct WeakRefFlag(Rc<Cell<bool>>);

impl WeakRefFlag {
    fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    /// Check whether the entity is still alive.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.get()
    }

    fn kill(&self) {
        self.0.set(false);
    }
}

impl fmt::Debug for WeakRefFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakRefFlag").field(&self.is_alive()).finish()
    }
}

type DeletionSubscriber = Box<dyn FnOnce(EntityKey)>;

/// Fires the deletion notification. Declared first in [`Native`] so it drops
/// before the value.
struct DeleteGuard {
    key: EntityKey,
    alive: WeakRefFlag,
    subscriber: RefCell<Option<DeletionSubscriber>>,
}

impl Drop for DeleteGuard {
    fn drop(&mut self) {
        self.alive.kill();
        if let Some(subscriber) = self.subscriber.get_mut().take() {
            subscriber(self.key);
        }
    }
}

/// Exclusive native owner of an entity.
///
/// # Example
///
/// ```
/// use objbridge_core::{Native, Wrappable};
///
/// struct Ship { hull: u32 }
/// impl Wrappable for Ship { const CLASS: &'static str = "Ship"; }
///
/// let ship = Native::new(Ship { hull: 100 });
/// let flag = ship.weakref_flag();
/// ship.borrow_mut().hull -= 10;
/// assert_eq!(ship.borrow().hull, 90);
///
/// ship.destroy();
/// assert!(!flag.is_alive());
/// ```
pub struct Native<T: Wrappable> {
    guard: DeleteGuard,
    cell: Rc<RefCell<T>>,
}

impl<T: Wrappable> Native<T> {
    /// Take ownership of a value.
    pub fn new(value: T) -> Self {
        let cell = Rc::new(RefCell::new(value));
        Self {
            guard: DeleteGuard {
                key: EntityKey::exclusive(&cell),
                alive: WeakRefFlag::new(),
                subscriber: RefCell::new(None),
            },
            cell,
        }
    }

    /// Identity of this entity.
    pub fn key(&self) -> EntityKey {
        self.guard.key
    }

    /// Immutably borrow the value.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.cell.borrow()
    }

    /// Mutably borrow the value.
    ///
    /// # Panics
    ///
    /// Panics if the value is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.cell.borrow_mut()
    }

    pub fn try_borrow(&self) -> Result<Ref<'_, T>, BorrowError> {
        self.cell.try_borrow()
    }

    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, T>, BorrowMutError> {
        self.cell.try_borrow_mut()
    }

    /// Liveness flag observers hold alongside their weak reference.
    pub fn weakref_flag(&self) -> WeakRefFlag {
        self.guard.alive.clone()
    }

    /// Type-erased weak reference to the value.
    pub fn downgrade_any(&self) -> Weak<RefCell<dyn Any>> {
        let erased: Rc<RefCell<dyn Any>> = self.cell.clone();
        Rc::downgrade(&erased)
    }

    /// Install the deletion subscriber.
    ///
    /// Each entity has a single subscriber. Returns `true` if an earlier
    /// subscriber was replaced.
    pub fn subscribe_deletion<F>(&self, subscriber: F) -> bool
    where
        F: FnOnce(EntityKey) + 'static,
    {
        self.guard
            .subscriber
            .borrow_mut()
            .replace(Box::new(subscriber))
            .is_some()
    }

    /// Remove the deletion subscriber, if any.
    pub fn unsubscribe_deletion(&self) -> bool {
        self.guard.subscriber.borrow_mut().take().is_some()
    }

    pub fn has_subscriber(&self) -> bool {
        self.guard.subscriber.borrow().is_some()
    }

    /// Destroy the entity, notifying the subscriber.
    pub fn destroy(self) {
        drop(self);
    }
}

impl<T: Wrappable + fmt::Debug> fmt::Debug for Native<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native")
            .field("class", &T::CLASS)
            .field("key", &self.guard.key)
            .field("value", &self.cell.try_borrow().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Probe {
        dropped: Rc<Cell<bool>>,
    }

    impl Wrappable for Probe {
        const CLASS: &'static str = "Probe";
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    fn probe() -> (Native<Probe>, Rc<Cell<bool>>) {
        let dropped = Rc::new(Cell::new(false));
        let native = Native::new(Probe {
            dropped: dropped.clone(),
        });
        (native, dropped)
    }

    #[test]
    fn destroy_kills_flag_and_frees_value() {
        let (native, dropped) = probe();
        let flag = native.weakref_flag();
        let weak = native.downgrade_any();

        assert!(flag.is_alive());
        assert!(weak.upgrade().is_some());

        native.destroy();

        assert!(!flag.is_alive());
        assert!(dropped.get());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn subscriber_fires_once_with_key() {
        let (native, _) = probe();
        let seen = Rc::new(Cell::new(None));
        let key = native.key();

        let sink = seen.clone();
        assert!(!native.subscribe_deletion(move |k| sink.set(Some(k))));
        native.destroy();

        assert_eq!(seen.get(), Some(key));
    }

    #[test]
    fn subscriber_sees_dead_flag_but_live_value() {
        let (native, dropped) = probe();
        let flag = native.weakref_flag();
        let weak = native.downgrade_any();
        let observed = Rc::new(Cell::new((true, false)));

        let sink = observed.clone();
        let probe_dropped = dropped.clone();
        native.subscribe_deletion(move |_| {
            let value_live = weak.upgrade().is_some() && !probe_dropped.get();
            sink.set((flag.is_alive(), value_live));
        });
        native.destroy();

        assert_eq!(observed.get(), (false, true));
        assert!(dropped.get());
    }

    #[test]
    fn replacing_subscriber_reports_replacement() {
        let (native, _) = probe();
        let first = Rc::new(Cell::new(false));
        let second = Rc::new(Cell::new(false));

        let f = first.clone();
        native.subscribe_deletion(move |_| f.set(true));
        let s = second.clone();
        assert!(native.subscribe_deletion(move |_| s.set(true)));
        native.destroy();

        assert!(!first.get());
        assert!(second.get());
    }

    #[test]
    fn unsubscribe_silences_notification() {
        let (native, _) = probe();
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();
        native.subscribe_deletion(move |_| f.set(true));

        assert!(native.has_subscriber());
        assert!(native.unsubscribe_deletion());
        assert!(!native.has_subscriber());
        native.destroy();

        assert!(!fired.get());
    }

    #[test]
    fn exclusive_keys_never_repeat() {
        let (a, _) = probe();
        let key_a = a.key();
        a.destroy();
        let (b, _) = probe();

        assert_ne!(key_a, b.key());
        assert!(!b.key().is_shared());
    }

    #[test]
    fn shared_key_follows_allocation() {
        let rc = Rc::new(RefCell::new(5u32));
        let clone = rc.clone();
        assert_eq!(EntityKey::shared(&rc), EntityKey::shared(&clone));
        assert!(EntityKey::shared(&rc).is_shared());
        let other = Rc::new(RefCell::new(5u32));
        assert_ne!(EntityKey::shared(&rc), EntityKey::shared(&other));
    }
}
