//! Native views from derived entities onto their base types.
//!
//! Script classes form an inheritance chain, but Rust types do not. When a
//! `Planet` proxy receives a method registered on `Body`, the method asks for
//! its receiver as `Body`. An upcast registered for `(Planet, Body)` projects
//! the `Planet` value onto its embedded `Body`.

use std::any::{Any, TypeId};
use std::collections::VecDeque;

use rustc_hash::FxHashMap;

trait Projection {
    fn project<'a>(&self, any: &'a dyn Any) -> Option<&'a dyn Any>;
    fn project_mut<'a>(&self, any: &'a mut dyn Any) -> Option<&'a mut dyn Any>;
}

struct FieldProjection<D, B> {
    get: fn(&D) -> &B,
    get_mut: fn(&mut D) -> &mut B,
}

impl<D: Any, B: Any> Projection for FieldProjection<D, B> {
    fn project<'a>(&self, any: &'a dyn Any) -> Option<&'a dyn Any> {
        let derived = any.downcast_ref::<D>()?;
        Some((self.get)(derived) as &dyn Any)
    }

    fn project_mut<'a>(&self, any: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        let derived = any.downcast_mut::<D>()?;
        Some((self.get_mut)(derived) as &mut dyn Any)
    }
}

/// Table of registered `(derived, base)` projections.
///
/// Projections compose: with `(Ship, ModelBody)` and `(ModelBody, Body)`
/// registered, a `Ship` can be viewed as a `Body` without a direct entry.
#[derive(Default)]
pub struct UpcastTable {
    entries: FxHashMap<(TypeId, TypeId), Box<dyn Projection>>,
    bases: FxHashMap<TypeId, Vec<TypeId>>,
}

impl UpcastTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a projection from `D` onto `B`. Returns `false` if one existed.
    pub fn register<D: Any, B: Any>(
        &mut self,
        get: fn(&D) -> &B,
        get_mut: fn(&mut D) -> &mut B,
    ) -> bool {
        let key = (TypeId::of::<D>(), TypeId::of::<B>());
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, Box::new(FieldProjection { get, get_mut }));
        self.bases.entry(key.0).or_default().push(key.1);
        true
    }

    /// Shortest sequence of projections leading from `from` to `to`.
    fn route(&self, from: TypeId, to: TypeId) -> Option<Vec<&dyn Projection>> {
        let mut came_from: FxHashMap<TypeId, TypeId> = FxHashMap::default();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut hops = Vec::new();
                let mut node = to;
                while node != from {
                    let prev = *came_from.get(&node)?;
                    hops.push(&**self.entries.get(&(prev, node))?);
                    node = prev;
                }
                hops.reverse();
                return Some(hops);
            }
            for &next in self.bases.get(&current).into_iter().flatten() {
                if next != from && !came_from.contains_key(&next) {
                    came_from.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// View a value as `T`, directly or through registered projections.
    pub fn project<'a, T: Any>(&self, any: &'a dyn Any) -> Option<&'a T> {
        if let Some(value) = any.downcast_ref::<T>() {
            return Some(value);
        }
        let hops = self.route((*any).type_id(), TypeId::of::<T>())?;
        let mut current = any;
        for hop in hops {
            current = hop.project(current)?;
        }
        current.downcast_ref::<T>()
    }

    /// Mutable counterpart of [`project`](Self::project).
    pub fn project_mut<'a, T: Any>(&self, any: &'a mut dyn Any) -> Option<&'a mut T> {
        if any.is::<T>() {
            return any.downcast_mut::<T>();
        }
        let hops = self.route((*any).type_id(), TypeId::of::<T>())?;
        let mut current = any;
        for hop in hops {
            current = hop.project_mut(current)?;
        }
        current.downcast_mut::<T>()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for UpcastTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpcastTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}
