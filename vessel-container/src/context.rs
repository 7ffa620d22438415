//! The `Context` — a scope pairing an immutable registry with mutable
//! resolution state.
//!
//! A `Context` is built once from capability types and named bindings,
//! then *entered* to become the active scope of the current thread:
//!
//! ```
//! use vessel_container::context::Context;
//! use vessel_container::dependency;
//! use vessel_container::resolver::resolve;
//!
//! struct Greeter;
//! dependency!(Greeter = || Ok(Greeter));
//!
//! let context = Context::builder()
//!     .register::<Greeter>()
//!     .named("greeting", String::from("hello"))
//!     .build()
//!     .expect("valid context");
//!
//! let _guard = context.enter();
//! let greeter = resolve::<Greeter>().expect("resolvable");
//! ```
//!
//! Activation is strictly per thread: each thread of control has its own
//! stack of active scopes, and a scope entered on one thread is
//! invisible on every other. Entering with no enclosing scope starts
//! from empty state; entering nested snapshots the enclosing state so
//! the child inherits mocks and singletons without mutating the parent.
//! The guard restores the previous scope on drop and discards the
//! child's state.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{Dependency, Descriptor, Instance, erase};
use crate::error::{Result, VesselError};
use crate::key::DependencyKey;
use crate::registry::Registry;
use crate::state::{MockKey, ScopeState};

// ═══════════════════════════════════════════
// Activation stack (thread-local)
// ═══════════════════════════════════════════

pub(crate) struct ActiveScope {
    pub(crate) registry: Arc<Registry>,
    pub(crate) state: RefCell<ScopeState>,
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Rc<ActiveScope>>> = const { RefCell::new(Vec::new()) };
}

/// Runs `f` against the currently active scope of this thread.
///
/// The stack borrow is released before `f` runs, so resolution may
/// re-enter freely.
pub(crate) fn with_active<R>(f: impl FnOnce(&ActiveScope) -> Result<R>) -> Result<R> {
    let top = SCOPE_STACK.with(|stack| stack.borrow().last().cloned());
    match top {
        Some(scope) => f(&scope),
        None => Err(VesselError::NoActiveContext),
    }
}

// ═══════════════════════════════════════════
// ContextBuilder
// ═══════════════════════════════════════════

/// Builds a [`Context`] from capability types and named bindings.
pub struct ContextBuilder {
    registry: Registry,
}

impl ContextBuilder {
    fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Registers capability type `T`.
    pub fn register<T: Dependency>(mut self) -> Self {
        self.registry.insert(T::descriptor());
        self
    }

    /// Registers a capability by descriptor, for declarations made
    /// without the [`dependency!`](crate::dependency) macro.
    pub fn register_descriptor(mut self, descriptor: &'static Descriptor) -> Self {
        self.registry.insert(descriptor);
        self
    }

    /// Registers a named binding. Within one builder the last value
    /// bound under a name wins.
    pub fn named(mut self, name: impl Into<String>, value: impl Any + Send + Sync) -> Self {
        self.registry.insert_named(name.into(), erase(value));
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    /// [`VesselError::InvalidDependency`] if a named binding has a
    /// blank name.
    pub fn build(self) -> Result<Context> {
        if self.registry.contains_named("") {
            return Err(VesselError::InvalidDependency {
                reason: "named binding with a blank name".into(),
            });
        }
        debug!(registered = self.registry.len(), "Built context");
        Ok(Context {
            registry: Arc::new(self.registry),
        })
    }
}

// ═══════════════════════════════════════════
// Context
// ═══════════════════════════════════════════

/// A scope: an immutable set of capability types and named bindings,
/// activated per thread with [`enter`](Context::enter).
///
/// `Context` is cheap to clone and safe to share across threads; only
/// its activation (and the state that comes with it) is thread-local.
#[derive(Clone)]
pub struct Context {
    registry: Arc<Registry>,
}

impl Context {
    /// Creates a builder.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Builds a context straight from descriptors, without the builder.
    pub fn new(descriptors: impl IntoIterator<Item = &'static Descriptor>) -> Result<Context> {
        let mut builder = Self::builder();
        for descriptor in descriptors {
            builder = builder.register_descriptor(descriptor);
        }
        builder.build()
    }

    /// A context with nothing registered.
    pub fn empty() -> Context {
        Context {
            registry: Arc::new(Registry::new()),
        }
    }

    /// Enters this context: pushes it onto the current thread's
    /// activation stack and returns a guard that exits on drop.
    ///
    /// The entering scope starts from a snapshot of the enclosing
    /// scope's state, or empty when there is none.
    pub fn enter(&self) -> ContextGuard {
        let inherited = SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|enclosing| enclosing.state.borrow().snapshot())
                .unwrap_or_default()
        });
        let scope = Rc::new(ActiveScope {
            registry: Arc::clone(&self.registry),
            state: RefCell::new(inherited),
        });
        let depth = SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Rc::clone(&scope));
            stack.len()
        });
        debug!(depth, "Entered context");
        ContextGuard { scope }
    }

    /// Runs `f` with this context entered.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// A new context providing every capability type of both contexts.
    /// Named bindings are merged with `other` winning on collision.
    pub fn union(&self, other: &Context) -> Context {
        Context {
            registry: Arc::new(self.registry.union(&other.registry)),
        }
    }

    /// True iff capability type `T` is registered.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.registry.contains(&DependencyKey::of::<T>())
    }

    /// True iff a named binding exists under `name`.
    pub fn contains_named(&self, name: &str) -> bool {
        self.registry.contains_named(name)
    }

    /// Keys of every registered capability type.
    pub fn keys(&self) -> Vec<DependencyKey> {
        self.registry.keys()
    }
}

impl std::ops::BitOr for &Context {
    type Output = Context;

    fn bitor(self, rhs: &Context) -> Context {
        self.union(rhs)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.registry).finish()
    }
}

// ═══════════════════════════════════════════
// ContextGuard
// ═══════════════════════════════════════════

/// Exits the entered context on drop, restoring the previously active
/// scope and discarding the child's state.
///
/// Not `Send`: a scope activation belongs to the thread that entered it.
pub struct ContextGuard {
    scope: Rc<ActiveScope>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert!(
                stack.last().is_some_and(|top| Rc::ptr_eq(top, &self.scope)),
                "context guards must be dropped in reverse entry order"
            );
            stack.pop();
        });
        debug!("Exited context");
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard").finish()
    }
}

// ═══════════════════════════════════════════
// Mock facility
// ═══════════════════════════════════════════

/// Installs the declared stand-in for capability type `T` in the active
/// scope's override table and returns it.
///
/// Requires a `stand_in` clause in `T`'s declaration; see
/// [`mock_with`] for a caller-supplied stand-in.
///
/// # Errors
/// [`VesselError::NoActiveContext`] outside a scope;
/// [`VesselError::InvalidDependency`] when `T` declares no stand-in.
pub fn mock<T: Dependency>() -> Result<Instance> {
    with_active(|scope| {
        let descriptor = T::descriptor();
        let stand_in = descriptor.stand_in().ok_or_else(|| {
            VesselError::InvalidDependency {
                reason: format!("no stand-in declared for {}", descriptor.key()),
            }
        })?;
        let instance = stand_in().map_err(|e| VesselError::Injection {
            key: descriptor.key().clone(),
            binding: "stand-in".into(),
            owner: "mock".into(),
            source: Arc::from(e),
        })?;
        scope.state.borrow_mut().install_mock(
            MockKey::Capability(descriptor.key().clone()),
            Arc::clone(&instance),
        );
        Ok(instance)
    })
}

/// Installs `stand_in` as the override for capability type `T`.
///
/// The engine treats the stand-in as opaque: anything usable where the
/// real implementation would be.
pub fn mock_with<T: ?Sized + 'static>(stand_in: impl Any + Send + Sync) -> Result<Instance> {
    with_active(|scope| {
        let instance = erase(stand_in);
        scope.state.borrow_mut().install_mock(
            MockKey::Capability(DependencyKey::of::<T>()),
            Arc::clone(&instance),
        );
        Ok(instance)
    })
}

/// Installs `stand_in` as the override for the named binding `name`.
pub fn mock_named(name: impl Into<String>, stand_in: impl Any + Send + Sync) -> Result<Instance> {
    with_active(|scope| {
        let instance = erase(stand_in);
        scope
            .state
            .borrow_mut()
            .install_mock(MockKey::Named(name.into()), Arc::clone(&instance));
        Ok(instance)
    })
}
