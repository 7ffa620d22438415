//! Resolution — turning a request into an instance.
//!
//! The resolver answers a [`Request`] against the thread's active scope
//! in a fixed order: mock overrides first, then implementation selection
//! by declared specificity, then lifecycle caches, and only then the
//! implementation's constructor. A pending set guards against
//! construction cycles.
//!
//! Specificity is positional: each implementation's descriptor carries a
//! self-first ancestor chain, and its specificity for a requested
//! capability is the number of strictly more derived links above the
//! capability in that chain. The most specific registered implementation
//! wins; a tie at the greatest specificity is an error, while less
//! specific candidates are shadowed silently.

use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::context::{ActiveScope, with_active};
use crate::descriptor::{BoxError, Dependency, Descriptor, Instance};
use crate::error::{AmbiguousError, CircularError, Result, VesselError};
use crate::key::{DependencyKey, Key};
use crate::state::{MockKey, OwnerRef};

/// What a request asks for.
#[derive(Clone, Debug)]
pub enum RequestTarget {
    /// A capability type, resolved through implementation selection.
    Capability(DependencyKey),
    /// A named binding, looked up verbatim by its name.
    Named(Key),
}

/// One resolution request: a target plus the requester's identity, used
/// for per-owner caching and error messages.
#[derive(Clone, Debug)]
pub struct Request {
    target: RequestTarget,
    binding: String,
    owner: Option<OwnerRef>,
    /// The requested type's own descriptor, used as the implementation
    /// of last resort so unregistered concrete types stay requestable.
    fallback: Option<&'static Descriptor>,
}

impl Request {
    /// A request for capability type `T`.
    pub fn capability<T: Dependency>() -> Self {
        let descriptor = T::descriptor();
        Self {
            target: RequestTarget::Capability(descriptor.key().clone()),
            binding: descriptor.key().short_name(),
            owner: None,
            fallback: Some(descriptor),
        }
    }

    /// A request for a capability identified by an already-erased key.
    /// Without the descriptor there is no fallback: the key must match
    /// a registered implementation.
    pub fn capability_key(key: DependencyKey) -> Self {
        let binding = key.short_name();
        Self {
            target: RequestTarget::Capability(key),
            binding,
            owner: None,
            fallback: None,
        }
    }

    /// A request for the named binding `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::named_key(Key::new(name))
    }

    /// A named-binding request that also records the capability type
    /// the requesting site declared, for diagnostics.
    pub fn named_as<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::named_key(Key::typed::<T>(name))
    }

    fn named_key(key: Key) -> Self {
        Self {
            binding: key.name().to_string(),
            target: RequestTarget::Named(key),
            owner: None,
            fallback: None,
        }
    }

    /// Sets the binding name the requester uses for this dependency,
    /// as it should appear in error messages.
    pub fn binding(mut self, name: impl Into<String>) -> Self {
        self.binding = name.into();
        self
    }

    /// Attributes the request to an owner. Instance-lifecycle
    /// resolutions are then cached per owner for as long as the owner
    /// lives.
    pub fn owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    fn owner_name(&self) -> &str {
        self.owner
            .as_ref()
            .map(OwnerRef::name)
            .unwrap_or("<anonymous>")
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            RequestTarget::Capability(key) => write!(f, "{key}"),
            RequestTarget::Named(key) => write!(f, "{key}"),
        }
    }
}

/// Resolves a request against the active scope.
///
/// # Errors
/// [`VesselError::NoActiveContext`] outside a scope;
/// [`VesselError::Unregistered`], [`VesselError::Ambiguous`],
/// [`VesselError::NoNamedBinding`] when selection fails;
/// [`VesselError::Circular`] on a construction cycle;
/// [`VesselError::Injection`] when a constructor fails.
#[instrument(level = "debug", skip_all, fields(request = %request))]
pub fn provide(request: &Request) -> Result<Instance> {
    with_active(|scope| match &request.target {
        RequestTarget::Capability(key) => provide_capability(scope, key, request),
        RequestTarget::Named(key) => provide_named_in(scope, key.name()),
    })
}

/// Resolves capability type `T` without static knowledge of the
/// implementation; the caller downcasts to whichever implementation it
/// expects.
pub fn provide_type<T: Dependency>() -> Result<Instance> {
    provide(&Request::capability::<T>())
}

/// Resolves the named binding `name`.
pub fn provide_named(name: impl Into<String>) -> Result<Instance> {
    provide(&Request::named(name))
}

/// Resolves capability type `T` and downcasts to `T`.
///
/// Suits concrete requests where the winning implementation is `T`
/// itself. When `T` is abstract, or when a mock of another type may be
/// installed, use [`provide`] and downcast to the expected type.
pub fn resolve<T: Dependency>() -> Result<Arc<T>> {
    let instance = provide(&Request::capability::<T>())?;
    instance
        .downcast::<T>()
        .map_err(|_| VesselError::InvalidDependency {
            reason: format!(
                "instance resolved for {} is of another type",
                DependencyKey::of::<T>()
            ),
        })
}

fn provide_capability(
    scope: &ActiveScope,
    key: &DependencyKey,
    request: &Request,
) -> Result<Instance> {
    let mock = scope
        .state
        .borrow()
        .mock_for(&MockKey::Capability(key.clone()));
    if let Some(instance) = mock {
        trace!(key = %key, "Resolved from mock override");
        return Ok(instance);
    }

    let implementation = select_implementation(scope, key, request.fallback)?;
    instantiate(scope, implementation, request)
}

fn provide_named_in(scope: &ActiveScope, name: &str) -> Result<Instance> {
    let mock = scope
        .state
        .borrow()
        .mock_for(&MockKey::Named(name.to_string()));
    if let Some(instance) = mock {
        trace!(name, "Resolved named binding from mock override");
        return Ok(instance);
    }

    scope
        .registry
        .named(name)
        .ok_or_else(|| VesselError::NoNamedBinding {
            name: name.to_string(),
        })
}

/// Picks the most specific registered non-abstract implementation of
/// `key`. With nothing registered, the requested type's own descriptor
/// serves as the implementation when it is concrete.
fn select_implementation(
    scope: &ActiveScope,
    key: &DependencyKey,
    fallback: Option<&'static Descriptor>,
) -> Result<&'static Descriptor> {
    let mut best: Vec<&'static Descriptor> = Vec::new();
    let mut best_specificity = 0usize;

    for descriptor in scope.registry.descriptors() {
        if descriptor.is_abstract() {
            continue;
        }
        let Some(specificity) = descriptor.specificity_of(key) else {
            continue;
        };
        if best.is_empty() || specificity > best_specificity {
            best_specificity = specificity;
            best = vec![descriptor];
        } else if specificity == best_specificity {
            best.push(descriptor);
        }
    }

    match best.len() {
        0 => match fallback {
            Some(descriptor) if !descriptor.is_abstract() => {
                trace!(key = %key, "No registered implementation, constructing the requested type itself");
                Ok(descriptor)
            }
            _ => Err(VesselError::Unregistered {
                requested: key.clone(),
            }),
        },
        1 => {
            trace!(key = %key, implementation = %best[0].key(), "Selected implementation");
            Ok(best[0])
        }
        _ => {
            let mut candidates: Vec<DependencyKey> =
                best.iter().map(|d| d.key().clone()).collect();
            candidates.sort_by_key(|k| k.type_name());
            Err(VesselError::Ambiguous(AmbiguousError {
                requested: key.clone(),
                candidates,
            }))
        }
    }
}

/// Constructs (or fetches from a cache) an instance of the selected
/// implementation, guarding against cycles.
fn instantiate(
    scope: &ActiveScope,
    implementation: &'static Descriptor,
    request: &Request,
) -> Result<Instance> {
    let key = implementation.key().clone();

    if scope.state.borrow().is_pending(&key) {
        return Err(VesselError::Circular(CircularError {
            requested: key,
            binding: request.binding.clone(),
            owner: request.owner_name().to_string(),
        }));
    }

    scope.state.borrow_mut().begin_pending(key.clone());
    let _pending = PendingGuard { scope, key };
    construct_with_lifecycle(scope, implementation, request)
}

/// Clears the pending entry on every exit path, unwinding included.
struct PendingGuard<'a> {
    scope: &'a ActiveScope,
    key: DependencyKey,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.scope.state.borrow_mut().end_pending(&self.key);
    }
}

// State borrows here are short-lived on purpose: the constructor
// re-enters the resolver for its own parameters, and a borrow held
// across that call would abort on the nested access.
fn construct_with_lifecycle(
    scope: &ActiveScope,
    implementation: &'static Descriptor,
    request: &Request,
) -> Result<Instance> {
    let key = implementation.key().clone();

    if implementation.is_singleton() {
        if let Some(instance) = scope.state.borrow().singleton(&key) {
            trace!(key = %key, "Resolved from singleton cache");
            return Ok(instance);
        }
        let instance = construct(implementation, request)?;
        scope
            .state
            .borrow_mut()
            .store_singleton(key, Arc::clone(&instance));
        return Ok(instance);
    }

    if let Some(owner) = &request.owner {
        if let Some(instance) = scope.state.borrow_mut().cached_instance(&key, owner) {
            trace!(key = %key, owner = %owner.name(), "Resolved from per-owner cache");
            return Ok(instance);
        }
        let instance = construct(implementation, request)?;
        scope
            .state
            .borrow_mut()
            .store_instance(key, owner, Arc::clone(&instance));
        return Ok(instance);
    }

    construct(implementation, request)
}

fn construct(implementation: &'static Descriptor, request: &Request) -> Result<Instance> {
    // Non-abstract by selection, so the constructor is present.
    let Some(constructor) = implementation.construct() else {
        return Err(VesselError::Unregistered {
            requested: implementation.key().clone(),
        });
    };
    debug!(key = %implementation.key(), "Constructing");
    constructor().map_err(|e| wrap_construction_failure(implementation, request, e))
}

/// A circular-dependency failure raised inside a constructor passes
/// through verbatim; any other failure, resolution or otherwise,
/// becomes an [`VesselError::Injection`] carrying the original cause.
fn wrap_construction_failure(
    implementation: &'static Descriptor,
    request: &Request,
    error: BoxError,
) -> VesselError {
    let wrap = |source: Arc<dyn std::error::Error + Send + Sync>| VesselError::Injection {
        key: implementation.key().clone(),
        binding: request.binding.clone(),
        owner: request.owner_name().to_string(),
        source,
    };
    match error.downcast::<VesselError>() {
        Ok(resolution) => match *resolution {
            circular @ VesselError::Circular(_) => circular,
            other => wrap(Arc::new(other)),
        },
        Err(other) => wrap(Arc::from(other)),
    }
}
