//! Identity map: at most one proxy per live native entity.
//!
//! Exclusive entities map persistently: the map holds the proxy strongly
//! until the entity's deletion notification removes it. Shared entities map
//! transiently: the map holds the proxy weakly and the proxy removes its own
//! entry when the last script reference drops.
//!
//! Removal always names the proxy being removed. An entry that has since been
//! replaced by a newer proxy for the same key is left alone.
//!
//! Removals never drop a proxy while the table is borrowed. A removal that
//! arrives while the table is busy is queued and applied by the next map
//! operation.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use objbridge_core::EntityKey;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::proxy::{ProxyId, ProxyObject, ProxyRef};

enum MapEntry {
    Persistent(ProxyRef),
    Transient { proxy: Weak<ProxyObject>, id: ProxyId },
}

impl MapEntry {
    fn id(&self) -> ProxyId {
        match self {
            MapEntry::Persistent(proxy) => proxy.id(),
            MapEntry::Transient { id, .. } => *id,
        }
    }

    fn upgrade(&self) -> Option<ProxyRef> {
        match self {
            MapEntry::Persistent(proxy) => Some(proxy.clone()),
            MapEntry::Transient { proxy, .. } => proxy.upgrade().map(ProxyRef::from_rc),
        }
    }
}

type Entries = FxHashMap<EntityKey, MapEntry>;

fn take_matching(entries: &mut Entries, key: EntityKey, id: ProxyId) -> Option<MapEntry> {
    match entries.get(&key) {
        Some(entry) if entry.id() == id => entries.remove(&key),
        _ => None,
    }
}

#[derive(Default)]
struct MapInner {
    entries: RefCell<Entries>,
    pending: RefCell<Vec<(EntityKey, ProxyId)>>,
}

impl MapInner {
    /// Remove `key` if it still maps to proxy `id`.
    fn release(&self, key: EntityKey, id: ProxyId) {
        let removed = {
            let Ok(mut entries) = self.entries.try_borrow_mut() else {
                trace!(?key, id, "identity map busy, deferring removal");
                self.pending.borrow_mut().push((key, id));
                return;
            };
            take_matching(&mut entries, key, id)
        };
        if removed.is_some() {
            trace!(?key, id, "removed identity mapping");
        }
        drop(removed);
    }

    fn drain_pending(&self) {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        if pending.is_empty() {
            return;
        }
        let mut removed = Vec::with_capacity(pending.len());
        match self.entries.try_borrow_mut() {
            Ok(mut entries) => {
                for (key, id) in pending {
                    removed.extend(take_matching(&mut entries, key, id));
                }
            }
            Err(_) => self.pending.borrow_mut().extend(pending),
        }
        drop(removed);
    }
}

/// Weak handle used by deletion subscribers and shared proxies.
#[derive(Clone)]
pub(crate) struct MapLink(Weak<MapInner>);

impl MapLink {
    /// Remove `key` if it still maps to proxy `id`. No-op once the map is gone.
    pub(crate) fn release(&self, key: EntityKey, id: ProxyId) {
        if let Some(inner) = self.0.upgrade() {
            inner.release(key, id);
        }
    }
}

/// Mapping from native entity keys to their live proxies.
pub struct IdentityMap {
    inner: Rc<MapInner>,
}

impl Default for IdentityMap {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Rc::new(MapInner {
                entries: RefCell::new(FxHashMap::with_capacity_and_hasher(
                    capacity,
                    Default::default(),
                )),
                pending: RefCell::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn link(&self) -> MapLink {
        MapLink(Rc::downgrade(&self.inner))
    }

    /// The live proxy for `key`, if any.
    pub fn lookup(&self, key: EntityKey) -> Option<ProxyRef> {
        self.inner.drain_pending();
        self.inner.entries.borrow().get(&key).and_then(MapEntry::upgrade)
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.lookup(key).is_some()
    }

    /// Map `key` to `proxy`, holding it strongly.
    pub(crate) fn insert_persistent(&self, key: EntityKey, proxy: ProxyRef) {
        self.inner.drain_pending();
        let previous = self
            .inner
            .entries
            .borrow_mut()
            .insert(key, MapEntry::Persistent(proxy));
        drop(previous);
    }

    /// Map `key` to `proxy`, holding it weakly.
    pub(crate) fn insert_transient(&self, key: EntityKey, proxy: &ProxyRef) {
        self.inner.drain_pending();
        let entry = MapEntry::Transient {
            proxy: proxy.downgrade(),
            id: proxy.id(),
        };
        let previous = self.inner.entries.borrow_mut().insert(key, entry);
        drop(previous);
    }

    /// Remove `key` if it still maps to proxy `id`.
    pub(crate) fn remove_matching(&self, key: EntityKey, id: ProxyId) {
        self.inner.release(key, id);
    }

    /// Number of entries, including removals still queued.
    pub fn len(&self) -> usize {
        self.inner.drain_pending();
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every mapping, returning how many there were.
    pub fn clear(&self) -> usize {
        self.inner.pending.borrow_mut().clear();
        let entries = std::mem::take(&mut *self.inner.entries.borrow_mut());
        let count = entries.len();
        drop(entries);
        count
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("entries", &self.inner.entries.try_borrow().map(|e| e.len()).ok())
            .field("pending", &self.inner.pending.try_borrow().map(|p| p.len()).ok())
            .finish()
    }
}
