//! Mutable resolution state of one active scope.
//!
//! [`ScopeState`] holds the four tables the resolver mutates while a
//! scope is active: the pending set (cycle guard), the singleton cache,
//! the per-owner instance cache and the mock overrides. It lives inside
//! the thread-local activation stack and is never shared between
//! threads, so no locking is involved.
//!
//! The per-owner cache holds its owners weakly: an entry is evicted once
//! its owner has been dropped. There is no background sweep; dead
//! entries are purged opportunistically whenever the cache is touched.

use std::any::{Any, type_name};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::descriptor::Instance;
use crate::key::DependencyKey;

/// Identity of a requesting owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OwnerId {
    /// An object, identified by its allocation address.
    Object(usize),
    /// A callable, identified by its name.
    Callable(&'static str),
}

#[derive(Clone)]
enum OwnerHandle {
    Object(Weak<dyn Any + Send + Sync>),
    Callable,
}

/// The requesting owner of a resolution: keys the per-owner instance
/// cache and names the requester in error messages.
///
/// An object owner is held weakly; its cache entries die with it. A
/// callable owner (function-parameter binding) has no lifetime of its
/// own and its entries last until scope exit.
#[derive(Clone)]
pub struct OwnerRef {
    id: OwnerId,
    handle: OwnerHandle,
    name: String,
}

impl OwnerRef {
    /// An owner identified by an object.
    pub fn object<T: Any + Send + Sync>(owner: &Arc<T>) -> Self {
        Self::object_named(owner, type_name::<T>())
    }

    /// An object owner with an explicit display name.
    pub fn object_named<T: Any + Send + Sync>(owner: &Arc<T>, name: &str) -> Self {
        let weak = Arc::downgrade(owner);
        let weak: Weak<dyn Any + Send + Sync> = weak;
        Self {
            id: OwnerId::Object(Arc::as_ptr(owner) as *const () as usize),
            handle: OwnerHandle::Object(weak),
            name: vessel_support::rendering::shorten_type_name(name),
        }
    }

    /// An owner identified by a callable's name.
    pub fn callable(name: &'static str) -> Self {
        Self {
            id: OwnerId::Callable(name),
            handle: OwnerHandle::Callable,
            name: name.to_string(),
        }
    }

    /// The display name used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> &OwnerId {
        &self.id
    }

    fn is_alive(&self) -> bool {
        match &self.handle {
            OwnerHandle::Object(weak) => weak.strong_count() > 0,
            OwnerHandle::Callable => true,
        }
    }
}

impl fmt::Debug for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerRef({})", self.name)
    }
}

/// Key of the mock-override table: a capability type or a binding name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum MockKey {
    Capability(DependencyKey),
    Named(String),
}

struct OwnerSlot {
    handle: OwnerHandle,
    value: Instance,
}

impl OwnerSlot {
    fn is_alive(&self) -> bool {
        match &self.handle {
            OwnerHandle::Object(weak) => weak.strong_count() > 0,
            OwnerHandle::Callable => true,
        }
    }
}

/// The four mutable tables of one active scope.
#[derive(Default)]
pub(crate) struct ScopeState {
    /// Capability types currently mid-construction.
    pending: HashSet<DependencyKey>,
    singletons: HashMap<DependencyKey, Instance>,
    instances: HashMap<(DependencyKey, OwnerId), OwnerSlot>,
    mocks: HashMap<MockKey, Instance>,
}

impl ScopeState {
    /// Clones this state for a nested scope activation: the child
    /// inherits mocks, singletons and live per-owner instances without
    /// aliasing the parent's tables.
    pub(crate) fn snapshot(&self) -> ScopeState {
        let instances = self
            .instances
            .iter()
            .filter(|(_, slot)| slot.is_alive())
            .map(|(key, slot)| {
                (
                    key.clone(),
                    OwnerSlot {
                        handle: slot.handle.clone(),
                        value: slot.value.clone(),
                    },
                )
            })
            .collect();
        ScopeState {
            pending: self.pending.clone(),
            singletons: self.singletons.clone(),
            instances,
            mocks: self.mocks.clone(),
        }
    }

    // ── cycle guard ──

    pub(crate) fn is_pending(&self, key: &DependencyKey) -> bool {
        self.pending.contains(key)
    }

    pub(crate) fn begin_pending(&mut self, key: DependencyKey) {
        trace!(key = %key, "Construction pending");
        self.pending.insert(key);
    }

    pub(crate) fn end_pending(&mut self, key: &DependencyKey) {
        self.pending.remove(key);
    }

    // ── singleton cache ──

    pub(crate) fn singleton(&self, key: &DependencyKey) -> Option<Instance> {
        self.singletons.get(key).cloned()
    }

    pub(crate) fn store_singleton(&mut self, key: DependencyKey, value: Instance) {
        trace!(key = %key, "Cached singleton");
        self.singletons.insert(key, value);
    }

    // ── per-owner cache ──

    /// Looks up a per-owner entry, purging dead owners first.
    pub(crate) fn cached_instance(
        &mut self,
        key: &DependencyKey,
        owner: &OwnerRef,
    ) -> Option<Instance> {
        self.purge_dead_owners();
        if !owner.is_alive() {
            return None;
        }
        self.instances
            .get(&(key.clone(), owner.id().clone()))
            .map(|slot| slot.value.clone())
    }

    pub(crate) fn store_instance(
        &mut self,
        key: DependencyKey,
        owner: &OwnerRef,
        value: Instance,
    ) {
        trace!(key = %key, owner = %owner.name(), "Cached per-owner instance");
        self.instances.insert(
            (key, owner.id().clone()),
            OwnerSlot {
                handle: owner.handle.clone(),
                value,
            },
        );
    }

    fn purge_dead_owners(&mut self) {
        self.instances.retain(|_, slot| slot.is_alive());
    }

    /// Number of live per-owner entries, after purging.
    #[cfg(test)]
    pub(crate) fn live_instances(&mut self) -> usize {
        self.purge_dead_owners();
        self.instances.len()
    }

    // ── mock overrides ──

    pub(crate) fn mock_for(&self, key: &MockKey) -> Option<Instance> {
        self.mocks.get(key).cloned()
    }

    #[cfg(test)]
    pub(crate) fn is_mocked(&self, key: &MockKey) -> bool {
        self.mocks.contains_key(key)
    }

    pub(crate) fn install_mock(&mut self, key: MockKey, value: Instance) {
        trace!(?key, "Installed mock override");
        self.mocks.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::erase;

    struct Widget;

    fn widget_key() -> DependencyKey {
        DependencyKey::of::<Widget>()
    }

    #[test]
    fn pending_round_trip() {
        let mut state = ScopeState::default();
        assert!(!state.is_pending(&widget_key()));
        state.begin_pending(widget_key());
        assert!(state.is_pending(&widget_key()));
        state.end_pending(&widget_key());
        assert!(!state.is_pending(&widget_key()));
    }

    #[test]
    fn singleton_cache() {
        let mut state = ScopeState::default();
        assert!(state.singleton(&widget_key()).is_none());
        let instance = erase(Widget);
        state.store_singleton(widget_key(), instance.clone());
        let cached = state.singleton(&widget_key()).unwrap();
        assert!(Arc::ptr_eq(&cached, &instance));
    }

    #[test]
    fn per_owner_cache_distinguishes_owners() {
        let mut state = ScopeState::default();
        let owner_a = Arc::new(0u8);
        let owner_b = Arc::new(0u8);
        let ref_a = OwnerRef::object(&owner_a);
        let ref_b = OwnerRef::object(&owner_b);

        let for_a = erase(Widget);
        state.store_instance(widget_key(), &ref_a, for_a.clone());

        let hit = state.cached_instance(&widget_key(), &ref_a).unwrap();
        assert!(Arc::ptr_eq(&hit, &for_a));
        assert!(state.cached_instance(&widget_key(), &ref_b).is_none());
    }

    #[test]
    fn dead_owner_entry_is_purged() {
        let mut state = ScopeState::default();
        let owner = Arc::new(0u8);
        let owner_ref = OwnerRef::object(&owner);
        state.store_instance(widget_key(), &owner_ref, erase(Widget));
        assert_eq!(state.live_instances(), 1);

        drop(owner);
        assert!(state.cached_instance(&widget_key(), &owner_ref).is_none());
        assert_eq!(state.live_instances(), 0);
    }

    #[test]
    fn callable_owner_stays_alive() {
        let mut state = ScopeState::default();
        let owner = OwnerRef::callable("setup");
        state.store_instance(widget_key(), &owner, erase(Widget));
        assert!(state.cached_instance(&widget_key(), &owner).is_some());
    }

    #[test]
    fn snapshot_copies_tables() {
        let mut state = ScopeState::default();
        state.store_singleton(widget_key(), erase(Widget));
        state.install_mock(MockKey::Named("url".into()), erase(1u8));

        let mut snapshot = state.snapshot();
        assert!(snapshot.singleton(&widget_key()).is_some());
        assert!(snapshot.is_mocked(&MockKey::Named("url".into())));

        // mutating the snapshot leaves the original untouched
        snapshot.install_mock(MockKey::Capability(widget_key()), erase(2u8));
        assert!(!state.is_mocked(&MockKey::Capability(widget_key())));
    }

    #[test]
    fn snapshot_drops_dead_owner_entries() {
        let mut state = ScopeState::default();
        let owner = Arc::new(0u8);
        let owner_ref = OwnerRef::object(&owner);
        state.store_instance(widget_key(), &owner_ref, erase(Widget));
        drop(owner);

        let mut snapshot = state.snapshot();
        assert_eq!(snapshot.live_instances(), 0);
    }
}
