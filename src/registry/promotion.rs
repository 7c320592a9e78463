//! Promotion rules: pick the most-derived class for a pushed entity.
//!
//! Native code often hands out entities through a base-typed reference. A
//! promotion rule `(base, derived, test)` says: when an entity is pushed as
//! `base` and `test` accepts it, expose it as `derived` instead. Rules for a
//! base are tried in registration order and the first match wins. Resolution
//! then continues from the promoted class, so `Body -> ModelBody -> Ship`
//! chains resolve in one push.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

/// Dynamic type test applied to the entity being pushed.
pub type PromotionTest = Rc<dyn Fn(&dyn Any) -> bool>;

/// Test that accepts entities whose concrete type is `D`.
pub fn downcast_test<D: Any>() -> PromotionTest {
    Rc::new(|entity: &dyn Any| entity.is::<D>())
}

/// Test that accepts entities of concrete type `T` for which `f` holds.
///
/// Useful when one Rust type backs several script classes, e.g. an enum
/// discriminant selecting the class.
pub fn predicate<T, F>(f: F) -> PromotionTest
where
    T: Any,
    F: Fn(&T) -> bool + 'static,
{
    Rc::new(move |entity: &dyn Any| entity.downcast_ref::<T>().is_some_and(|v| f(v)))
}

/// A single promotion rule.
#[derive(Clone)]
pub struct PromotionRule {
    pub base: String,
    pub derived: String,
    pub test: PromotionTest,
}

impl fmt::Debug for PromotionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromotionRule")
            .field("base", &self.base)
            .field("derived", &self.derived)
            .finish_non_exhaustive()
    }
}

/// Ordered promotion rules keyed by base class.
#[derive(Debug, Default)]
pub struct PromotionTable {
    rules: FxHashMap<String, Vec<PromotionRule>>,
}

impl PromotionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Returns `false` if `(base, derived)` is already present.
    pub fn insert(&mut self, rule: PromotionRule) -> bool {
        let rules = self.rules.entry(rule.base.clone()).or_default();
        if rules.iter().any(|r| r.derived == rule.derived) {
            return false;
        }
        rules.push(rule);
        true
    }

    pub fn has_rules(&self, base: &str) -> bool {
        self.rules.get(base).is_some_and(|r| !r.is_empty())
    }

    /// Rules registered for a base class, in registration order.
    pub fn rules_for(&self, base: &str) -> &[PromotionRule] {
        self.rules.get(base).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the class to expose `entity` as, starting from `class`.
    ///
    /// Applies at most `max_depth` promotions.
    pub fn resolve<'a>(&'a self, class: &'a str, entity: &dyn Any, max_depth: usize) -> &'a str {
        let mut current = class;
        for _ in 0..max_depth {
            let Some(rule) = self
                .rules_for(current)
                .iter()
                .find(|rule| (rule.test)(entity))
            else {
                break;
            };
            current = &rule.derived;
        }
        current
    }
}
