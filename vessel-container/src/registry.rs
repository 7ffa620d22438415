//! Capability registry — the immutable half of a scope.
//!
//! A registry is the set of capability descriptors plus the named
//! bindings supplied at [`Context`](crate::context::Context)
//! construction. It never changes for the lifetime of its scope, which
//! is what makes a `Context` safely shareable across threads.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::descriptor::{Descriptor, Instance};
use crate::key::DependencyKey;

pub(crate) struct Registry {
    descriptors: HashMap<DependencyKey, &'static Descriptor>,
    named: HashMap<String, Instance>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
            named: HashMap::new(),
        }
    }

    /// Adds a capability descriptor. Set semantics: registering the same
    /// type twice is a no-op.
    pub(crate) fn insert(&mut self, descriptor: &'static Descriptor) {
        if self
            .descriptors
            .insert(descriptor.key().clone(), descriptor)
            .is_none()
        {
            debug!(key = %descriptor.key(), lifecycle = %descriptor.lifecycle(), "Registered capability");
        }
    }

    /// Adds a named binding. Within one registry, the last value bound
    /// under a name wins.
    pub(crate) fn insert_named(&mut self, name: String, value: Instance) {
        debug!(name = %name, "Registered named binding");
        self.named.insert(name, value);
    }

    pub(crate) fn contains(&self, key: &DependencyKey) -> bool {
        self.descriptors.contains_key(key)
    }

    pub(crate) fn contains_named(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    pub(crate) fn named(&self, name: &str) -> Option<Instance> {
        self.named.get(name).cloned()
    }

    pub(crate) fn descriptors(&self) -> impl Iterator<Item = &'static Descriptor> + '_ {
        self.descriptors.values().copied()
    }

    pub(crate) fn keys(&self) -> Vec<DependencyKey> {
        self.descriptors.keys().cloned().collect()
    }

    pub(crate) fn named_keys(&self) -> Vec<&str> {
        self.named.keys().map(String::as_str).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Set-union of capability types; named bindings merged with the
    /// right-hand side winning on collision.
    pub(crate) fn union(&self, other: &Registry) -> Registry {
        let mut merged = Registry::new();
        for descriptor in self.descriptors() {
            merged.insert(descriptor);
        }
        for descriptor in other.descriptors() {
            merged.insert(descriptor);
        }
        for (name, value) in &self.named {
            merged.named.insert(name.clone(), value.clone());
        }
        for (name, value) in &other.named {
            merged.named.insert(name.clone(), value.clone());
        }
        merged
    }
}

// Debug lists registered type names and named-binding keys, sorted so
// the output is stable.
impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<String> =
            self.descriptors.keys().map(|k| k.short_name()).collect();
        types.sort();
        let mut names: Vec<&str> = self.named_keys();
        names.sort();
        f.debug_struct("Registry")
            .field("types", &types)
            .field("named", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency;
    use crate::descriptor::erase;

    struct Alpha;
    struct Beta;

    dependency!(Alpha = || Ok(Alpha));
    dependency!(Beta = || Ok(Beta));

    #[test]
    fn insert_and_contains() {
        use crate::descriptor::Dependency;

        let mut registry = Registry::new();
        registry.insert(Alpha::descriptor());
        assert!(registry.contains(&DependencyKey::of::<Alpha>()));
        assert!(!registry.contains(&DependencyKey::of::<Beta>()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_insert_is_noop() {
        use crate::descriptor::Dependency;

        let mut registry = Registry::new();
        registry.insert(Alpha::descriptor());
        registry.insert(Alpha::descriptor());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn named_lookup() {
        let mut registry = Registry::new();
        registry.insert_named("url".into(), erase(String::from("sqlite://")));
        let value = registry.named("url").unwrap();
        assert_eq!(
            *value.downcast::<String>().unwrap(),
            String::from("sqlite://")
        );
        assert!(registry.named("missing").is_none());
    }

    #[test]
    fn union_merges_types() {
        use crate::descriptor::Dependency;

        let mut left = Registry::new();
        left.insert(Alpha::descriptor());
        let mut right = Registry::new();
        right.insert(Beta::descriptor());

        let merged = left.union(&right);
        assert!(merged.contains(&DependencyKey::of::<Alpha>()));
        assert!(merged.contains(&DependencyKey::of::<Beta>()));
    }

    #[test]
    fn union_named_right_hand_wins() {
        let mut left = Registry::new();
        left.insert_named("url".into(), erase(String::from("left")));
        let mut right = Registry::new();
        right.insert_named("url".into(), erase(String::from("right")));

        let merged = left.union(&right);
        let value = merged.named("url").unwrap();
        assert_eq!(*value.downcast::<String>().unwrap(), String::from("right"));
    }
}
