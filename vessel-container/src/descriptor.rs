//! Capability descriptors — the declaration surface of the engine.
//!
//! A type becomes a capability type by carrying a [`Descriptor`]: its
//! identity, its declared ancestor chain, its lifecycle, an optional
//! constructor (absent for abstract capabilities), the constructor
//! parameters it needs, and an optional stand-in factory for the mock
//! facility.
//!
//! Descriptors are explicit data, validated when they are built. A
//! malformed declaration fails with
//! [`VesselError::InvalidDependency`](crate::error::VesselError) before
//! the type can ever be resolved, not in the middle of a resolution.
//!
//! Most declarations go through the [`dependency!`](crate::dependency)
//! macro, which builds the descriptor in a `Lazy` static:
//!
//! ```
//! use vessel_container::dependency;
//!
//! struct Log;
//! struct ConsoleLog;
//!
//! dependency!(abstract Log);
//! dependency!(ConsoleLog extends [Log] = || Ok(ConsoleLog));
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, VesselError};
use crate::key::DependencyKey;

/// A type-erased resolved instance.
///
/// Identity comparisons use `Arc::ptr_eq`; typed access goes through
/// `Arc::downcast`.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Error type produced by user constructors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A shared constructor: builds one type-erased instance.
///
/// `Arc` rather than `Box` because descriptors are `'static` and shared
/// freely between contexts and threads.
pub type ConstructFn =
    Arc<dyn Fn() -> std::result::Result<Instance, BoxError> + Send + Sync>;

/// Wraps a value as a type-erased [`Instance`].
pub fn erase<T: Any + Send + Sync>(value: T) -> Instance {
    Arc::new(value)
}

/// Instance lifecycle of a capability type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// A fresh or per-owner-cached instance per resolution.
    Instance,
    /// One instance shared by every requester within the active scope.
    Singleton,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Instance => write!(f, "Instance"),
            Lifecycle::Singleton => write!(f, "Singleton"),
        }
    }
}

/// How a declared constructor parameter is resolved.
#[derive(Debug, Clone)]
pub enum ParamBinding {
    /// Resolved as a capability type.
    Capability(DependencyKey),
    /// Resolved as a named binding.
    Named(&'static str),
}

/// A declared constructor parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub binding: ParamBinding,
}

/// A type explicitly marked injectable.
///
/// Implemented through the [`dependency!`](crate::dependency) macro in
/// almost all cases; a hand-rolled impl only needs to hand out a
/// `'static` descriptor.
pub trait Dependency: Any + Send + Sync {
    /// The descriptor declared for this capability type.
    fn descriptor() -> &'static Descriptor
    where
        Self: Sized;
}

/// Descriptor of one capability type.
pub struct Descriptor {
    key: DependencyKey,
    /// Self-first declared ancestor chain; the position of a requested
    /// capability in this chain is the candidate's specificity.
    ancestors: Vec<DependencyKey>,
    lifecycle: Lifecycle,
    construct: Option<ConstructFn>,
    stand_in: Option<ConstructFn>,
    params: Vec<ParamSpec>,
}

impl Descriptor {
    /// Starts a builder for capability type `T`.
    pub fn builder<T: Any + Send + Sync>() -> DescriptorBuilder {
        DescriptorBuilder {
            key: DependencyKey::of::<T>(),
            ancestors: vec![DependencyKey::of::<T>()],
            lifecycle: Lifecycle::Instance,
            construct: None,
            stand_in: None,
            params: Vec::new(),
        }
    }

    /// Returns the key of this capability type.
    #[inline]
    pub fn key(&self) -> &DependencyKey {
        &self.key
    }

    /// Returns the self-first ancestor chain.
    #[inline]
    pub fn ancestors(&self) -> &[DependencyKey] {
        &self.ancestors
    }

    /// Returns the declared lifecycle.
    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.lifecycle == Lifecycle::Singleton
    }

    /// An abstract capability has no constructor and can only be
    /// resolved through a registered subtype or a mock.
    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.construct.is_none()
    }

    /// Returns this type's specificity for `target`: the number of
    /// strictly more derived ancestors above `target` in this type's own
    /// chain. `None` when `target` is not an ancestor.
    pub fn specificity_of(&self, target: &DependencyKey) -> Option<usize> {
        self.ancestors.iter().position(|a| a == target)
    }

    /// Returns the declared constructor parameters.
    #[inline]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub(crate) fn construct(&self) -> Option<&ConstructFn> {
        self.construct.as_ref()
    }

    pub(crate) fn stand_in(&self) -> Option<&ConstructFn> {
        self.stand_in.as_ref()
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("key", &self.key)
            .field("ancestors", &self.ancestors)
            .field("lifecycle", &self.lifecycle)
            .field("abstract", &self.is_abstract())
            .finish()
    }
}

/// Builds and validates a [`Descriptor`].
pub struct DescriptorBuilder {
    key: DependencyKey,
    ancestors: Vec<DependencyKey>,
    lifecycle: Lifecycle,
    construct: Option<ConstructFn>,
    stand_in: Option<ConstructFn>,
    params: Vec<ParamSpec>,
}

impl DescriptorBuilder {
    /// Appends `A` to the ancestor chain. List ancestors nearest-first:
    /// the chain for `C` extending `B` extending `A` is `[B, A]`.
    pub fn ancestor<A: ?Sized + 'static>(mut self) -> Self {
        self.ancestors.push(DependencyKey::of::<A>());
        self
    }

    /// Marks the capability as a singleton.
    pub fn singleton(mut self) -> Self {
        self.lifecycle = Lifecycle::Singleton;
        self
    }

    /// Sets the constructor. Constructors resolve their own declared
    /// parameters through [`provide`](crate::resolver::provide).
    pub fn constructor<T, F>(mut self, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        self.construct = Some(Arc::new(move || f().map(|v| Arc::new(v) as Instance)));
        self
    }

    /// Sets the stand-in factory used by the mock facility.
    pub fn stand_in<T, F>(mut self, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.stand_in = Some(Arc::new(move || Ok(Arc::new(f()) as Instance)));
        self
    }

    /// Declares a constructor parameter resolved as capability type `P`.
    pub fn capability_param<P: Any + Send + Sync>(mut self, name: &'static str) -> Self {
        self.params.push(ParamSpec {
            name,
            binding: ParamBinding::Capability(DependencyKey::of::<P>()),
        });
        self
    }

    /// Declares a constructor parameter resolved as a named binding.
    pub fn named_param(mut self, name: &'static str, key: &'static str) -> Self {
        self.params.push(ParamSpec {
            name,
            binding: ParamBinding::Named(key),
        });
        self
    }

    /// Validates the declaration and produces the descriptor.
    ///
    /// # Errors
    /// [`VesselError::InvalidDependency`] when the declaration is
    /// malformed: the type extends itself, parameter names collide or
    /// are blank, a named parameter has a blank key, an abstract
    /// capability declares parameters, or a singleton has no
    /// constructor.
    pub fn build(self) -> Result<Descriptor> {
        let invalid = |reason: String| VesselError::InvalidDependency { reason };

        if self.ancestors[1..].contains(&self.key) {
            return Err(invalid(format!("{} cannot extend itself", self.key)));
        }
        for (i, param) in self.params.iter().enumerate() {
            if param.name.is_empty() {
                return Err(invalid(format!(
                    "{} declares a parameter with a blank name",
                    self.key
                )));
            }
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return Err(invalid(format!(
                    "{} declares parameter \"{}\" more than once",
                    self.key, param.name
                )));
            }
            if let ParamBinding::Named(key) = param.binding {
                if key.is_empty() {
                    return Err(invalid(format!(
                        "parameter \"{}\" of {} names a blank binding key",
                        param.name, self.key
                    )));
                }
            }
        }
        if self.construct.is_none() && !self.params.is_empty() {
            return Err(invalid(format!(
                "abstract capability {} cannot declare constructor parameters",
                self.key
            )));
        }
        if self.lifecycle == Lifecycle::Singleton && self.construct.is_none() {
            return Err(invalid(format!(
                "singleton capability {} must declare a constructor",
                self.key
            )));
        }

        tracing::trace!(key = %self.key, lifecycle = %self.lifecycle, "Declared capability");
        Ok(Descriptor {
            key: self.key,
            ancestors: self.ancestors,
            lifecycle: self.lifecycle,
            construct: self.construct,
            stand_in: self.stand_in,
            params: self.params,
        })
    }
}

/// Declares a capability type: implements [`Dependency`] by building a
/// validated [`Descriptor`] in a lazy static.
///
/// Forms:
///
/// ```text
/// dependency!(abstract Log);
/// dependency!(abstract FileLog extends [Log]);
/// dependency!(ConsoleLog extends [Log] = || Ok(ConsoleLog));
/// dependency!(singleton AppConfig = || Ok(AppConfig::default()));
/// dependency!(Repo requires [db: Database, url: "db_url"] = || { ... });
/// dependency!(ConsoleLog extends [Log] = || Ok(ConsoleLog), stand_in = || ConsoleLog);
/// ```
///
/// `extends` lists the declared ancestor chain nearest-first (the Rust
/// analog of a method resolution order). `requires` declares the
/// constructor parameters for declaration-time validation; an identifier
/// means a capability type, a string literal means a named binding. The
/// constructor itself resolves those parameters with
/// [`provide`](crate::resolver::provide).
///
/// A malformed declaration panics on first use of the type, which is
/// the declaration-time failure the validation is designed to surface.
#[macro_export]
macro_rules! dependency {
    // parameter dispatch: string literal = named binding, ident = capability
    (@param $builder:expr, $p:ident, $key:literal) => {
        $builder.named_param(stringify!($p), $key)
    };
    (@param $builder:expr, $p:ident, $cap:ident) => {
        $builder.capability_param::<$cap>(stringify!($p))
    };

    // abstract capability
    (abstract $ty:ident $(extends [$($anc:ty),* $(,)?])? $(, stand_in = $si:expr)? $(;)?) => {
        impl $crate::descriptor::Dependency for $ty {
            fn descriptor() -> &'static $crate::descriptor::Descriptor {
                static DESCRIPTOR: $crate::once_cell::sync::Lazy<$crate::descriptor::Descriptor> =
                    $crate::once_cell::sync::Lazy::new(|| {
                        let builder = $crate::descriptor::Descriptor::builder::<$ty>();
                        $($(let builder = builder.ancestor::<$anc>();)*)?
                        $(let builder = builder.stand_in::<$ty, _>($si);)?
                        builder.build().unwrap_or_else(|e| {
                            panic!("invalid dependency declaration for {}: {e}", stringify!($ty))
                        })
                    });
                $crate::once_cell::sync::Lazy::force(&DESCRIPTOR)
            }
        }
    };

    // singleton capability
    (singleton $ty:ident $(extends [$($anc:ty),* $(,)?])? $(requires [$($p:ident: $pb:tt),* $(,)?])? = $ctor:expr $(, stand_in = $si:expr)? $(;)?) => {
        impl $crate::descriptor::Dependency for $ty {
            fn descriptor() -> &'static $crate::descriptor::Descriptor {
                static DESCRIPTOR: $crate::once_cell::sync::Lazy<$crate::descriptor::Descriptor> =
                    $crate::once_cell::sync::Lazy::new(|| {
                        let builder = $crate::descriptor::Descriptor::builder::<$ty>().singleton();
                        $($(let builder = builder.ancestor::<$anc>();)*)?
                        $($(let builder = $crate::dependency!(@param builder, $p, $pb);)*)?
                        let builder = builder.constructor::<$ty, _>($ctor);
                        $(let builder = builder.stand_in::<$ty, _>($si);)?
                        builder.build().unwrap_or_else(|e| {
                            panic!("invalid dependency declaration for {}: {e}", stringify!($ty))
                        })
                    });
                $crate::once_cell::sync::Lazy::force(&DESCRIPTOR)
            }
        }
    };

    // concrete capability
    ($ty:ident $(extends [$($anc:ty),* $(,)?])? $(requires [$($p:ident: $pb:tt),* $(,)?])? = $ctor:expr $(, stand_in = $si:expr)? $(;)?) => {
        impl $crate::descriptor::Dependency for $ty {
            fn descriptor() -> &'static $crate::descriptor::Descriptor {
                static DESCRIPTOR: $crate::once_cell::sync::Lazy<$crate::descriptor::Descriptor> =
                    $crate::once_cell::sync::Lazy::new(|| {
                        let builder = $crate::descriptor::Descriptor::builder::<$ty>();
                        $($(let builder = builder.ancestor::<$anc>();)*)?
                        $($(let builder = $crate::dependency!(@param builder, $p, $pb);)*)?
                        let builder = builder.constructor::<$ty, _>($ctor);
                        $(let builder = builder.stand_in::<$ty, _>($si);)?
                        builder.build().unwrap_or_else(|e| {
                            panic!("invalid dependency declaration for {}: {e}", stringify!($ty))
                        })
                    });
                $crate::once_cell::sync::Lazy::force(&DESCRIPTOR)
            }
        }
    };
}
