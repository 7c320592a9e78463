//! Class, promotion, and serializer registration.
//!
//! [`BridgeRegistry`] is built during start-up, bottom-up along the class
//! hierarchy, then sealed into a [`Bridge`](crate::Bridge). It is immutable
//! afterwards.
//!
//! ```ignore
//! let mut registry = BridgeRegistry::new();
//! registry.create_class(ClassBuilder::new("Body").method("GetLabel", get_label).build())?;
//! registry.create_class(ClassBuilder::new("Ship").parent("Body").build())?;
//! registry.register_promotion("Body", "Ship", downcast_test::<Ship>())?;
//! registry.register_serializer("Ship", ship_serializer())?;
//! ```

mod class_builder;
mod class_entry;
mod class_tree;
mod promotion;
mod serializer;
mod upcast;

pub use class_builder::ClassBuilder;
pub use class_entry::{AttrAccess, Attribute, ClassDescriptor, MetaMethod, PropertyAccess};
pub use class_tree::ClassTree;
pub use promotion::{PromotionRule, PromotionTable, PromotionTest, downcast_test, predicate};
pub use serializer::{DecodeFn, EncodeFn, EntityView, SerializerPair, SerializerTable};
pub use upcast::UpcastTable;

use std::any::Any;
use std::rc::Rc;

use objbridge_core::ClassHash;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::RegistrationError;
use crate::native_fn::NativeFn;
use crate::persist::NIL_TOKEN;

/// A subclass that inherits from a serializable class without a pair of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerGap {
    pub class: String,
    pub serializable_ancestor: String,
}

fn validate_class_name(name: &str) -> Result<(), RegistrationError> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name == NIL_TOKEN {
        "name is reserved for nil references"
    } else if name.contains('\n') {
        "name contains a line break"
    } else {
        return Ok(());
    };
    Err(RegistrationError::InvalidClassName {
        name: name.to_string(),
        reason,
    })
}

/// Start-up registry of classes, promotions, serializers, and upcasts.
#[derive(Debug, Default)]
pub struct BridgeRegistry {
    classes: FxHashMap<ClassHash, Rc<ClassDescriptor>>,
    tree: ClassTree,
    promotions: PromotionTable,
    serializers: SerializerTable,
    upcasts: UpcastTable,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // === Classes ===

    /// Register a class. Its parent, if any, must already be registered.
    pub fn create_class(
        &mut self,
        desc: ClassDescriptor,
    ) -> Result<ClassHash, RegistrationError> {
        validate_class_name(&desc.name)?;
        if self.classes.contains_key(&desc.hash) {
            return Err(RegistrationError::duplicate(&desc.name, "class"));
        }
        if let Some(parent) = desc.parent.as_deref() {
            if !self.tree.contains(parent) {
                return Err(RegistrationError::UnknownParent {
                    class: desc.name.clone(),
                    parent: parent.to_string(),
                });
            }
        }

        self.tree.insert(&desc.name, desc.parent.as_deref());
        debug!(
            class = %desc.name,
            parent = ?desc.parent,
            methods = desc.methods.len(),
            attributes = desc.attributes.len(),
            "registered class"
        );
        let hash = desc.hash;
        self.classes.insert(hash, Rc::new(desc));
        Ok(hash)
    }

    pub fn class(&self, name: &str) -> Option<&Rc<ClassDescriptor>> {
        self.classes.get(&ClassHash::from_name(name))
    }

    pub fn class_by_hash(&self, hash: ClassHash) -> Option<&Rc<ClassDescriptor>> {
        self.classes.get(&hash)
    }

    pub fn contains_class(&self, name: &str) -> bool {
        self.classes.contains_key(&ClassHash::from_name(name))
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn parent(&self, class: &str) -> Option<&str> {
        self.tree.parent(class)
    }

    pub fn ancestors(&self, class: &str) -> Vec<&str> {
        self.tree.ancestors(class)
    }

    pub fn descendants(&self, class: &str) -> Vec<&str> {
        self.tree.descendants(class)
    }

    /// Check if `class` is `ancestor` or one of its subclasses.
    pub fn is_a(&self, class: &str, ancestor: &str) -> bool {
        self.tree.is_a(class, ancestor)
    }

    /// Descriptors from `class` up to its root, most-derived first.
    pub fn chain<'a>(
        &'a self,
        class: &str,
    ) -> impl Iterator<Item = &'a Rc<ClassDescriptor>> + use<'a> {
        let mut next = self.class(class);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.parent.as_deref().and_then(|p| self.class(p));
            Some(current)
        })
    }

    /// Find a method on the class chain.
    pub fn find_method(&self, class: &str, name: &str) -> Option<&NativeFn> {
        self.chain(class).find_map(|desc| desc.find_method(name))
    }

    /// Find an attribute on the class chain.
    pub fn find_attribute(&self, class: &str, name: &str) -> Option<&Attribute> {
        self.chain(class).find_map(|desc| desc.find_attribute(name))
    }

    /// Find a metamethod on the class chain.
    pub fn find_meta(&self, class: &str, meta: MetaMethod) -> Option<&NativeFn> {
        self.chain(class).find_map(|desc| desc.find_meta(meta))
    }

    /// Find the nearest initializer on the class chain.
    pub fn find_initializer(&self, class: &str) -> Option<&NativeFn> {
        self.chain(class).find_map(|desc| desc.initializer.as_ref())
    }

    /// Property accessors on the class chain, nearest first.
    pub fn property_accessors<'a>(
        &'a self,
        class: &str,
    ) -> impl Iterator<Item = PropertyAccess> + use<'a> {
        self.chain(class).filter_map(|desc| desc.properties)
    }

    // === Promotions ===

    /// Register a promotion from `base` to `derived`.
    ///
    /// `derived` must be a strict subclass of `base`.
    pub fn register_promotion(
        &mut self,
        base: &str,
        derived: &str,
        test: PromotionTest,
    ) -> Result<(), RegistrationError> {
        for name in [base, derived] {
            if !self.contains_class(name) {
                return Err(RegistrationError::UnknownClass(name.to_string()));
            }
        }
        if base == derived || !self.is_a(derived, base) {
            return Err(RegistrationError::InvalidPromotion {
                base: base.to_string(),
                derived: derived.to_string(),
            });
        }

        let inserted = self.promotions.insert(PromotionRule {
            base: base.to_string(),
            derived: derived.to_string(),
            test,
        });
        if !inserted {
            return Err(RegistrationError::duplicate(
                format!("{base} -> {derived}"),
                "promotion",
            ));
        }
        debug!(base, derived, "registered promotion");
        Ok(())
    }

    pub fn has_promotions(&self, class: &str) -> bool {
        self.promotions.has_rules(class)
    }

    /// Resolve the class to expose `entity` as when pushed as `class`.
    pub fn resolve_promotion<'a>(
        &'a self,
        class: &'a str,
        entity: &dyn Any,
        max_depth: usize,
    ) -> &'a str {
        self.promotions.resolve(class, entity, max_depth)
    }

    pub fn promotions(&self) -> &PromotionTable {
        &self.promotions
    }

    // === Serializers ===

    /// Register the serializer pair for a class.
    pub fn register_serializer(
        &mut self,
        class: &str,
        pair: SerializerPair,
    ) -> Result<(), RegistrationError> {
        if !self.contains_class(class) {
            return Err(RegistrationError::UnknownClass(class.to_string()));
        }
        if !self.serializers.insert(class, pair) {
            return Err(RegistrationError::duplicate(class, "serializer"));
        }
        debug!(class, "registered serializer");
        Ok(())
    }

    /// Serializer pair registered for exactly this class.
    pub fn serializer(&self, class: &str) -> Option<&SerializerPair> {
        self.serializers.get(class)
    }

    /// Subclasses of serializable classes that have no pair of their own.
    pub fn audit_serializers(&self) -> Vec<SerializerGap> {
        let mut gaps = Vec::new();
        for class in self.serializers.classes() {
            for descendant in self.tree.descendants(class) {
                if !self.serializers.contains(descendant) {
                    gaps.push(SerializerGap {
                        class: descendant.to_string(),
                        serializable_ancestor: class.to_string(),
                    });
                }
            }
        }
        gaps.sort_by(|a, b| a.class.cmp(&b.class));
        gaps.dedup_by(|a, b| a.class == b.class);
        gaps
    }

    // === Upcasts ===

    /// Let methods registered for base type `B` borrow a `D` entity as `B`.
    pub fn register_upcast<D: Any, B: Any>(
        &mut self,
        get: fn(&D) -> &B,
        get_mut: fn(&mut D) -> &mut B,
    ) -> Result<(), RegistrationError> {
        if !self.upcasts.register::<D, B>(get, get_mut) {
            let name = format!(
                "{} -> {}",
                std::any::type_name::<D>(),
                std::any::type_name::<B>()
            );
            return Err(RegistrationError::duplicate(name, "upcast"));
        }
        Ok(())
    }

    pub fn upcasts(&self) -> &UpcastTable {
        &self.upcasts
    }
}
