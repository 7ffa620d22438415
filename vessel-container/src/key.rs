//! Capability identification keys.
//!
//! [`DependencyKey`] identifies a capability type within a registry.
//! [`Key`] identifies a named binding: a value registered under a string
//! key rather than a type, optionally annotated with the type the
//! requester declared for diagnostics.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use vessel_support::rendering::shorten_type_name;

/// Identifies a capability type in a registry.
///
/// # Examples
/// ```
/// use vessel_container::key::DependencyKey;
///
/// let key = DependencyKey::of::<String>();
/// assert_eq!(key.type_name(), "alloc::string::String");
/// assert_eq!(key.short_name(), "String");
/// ```
#[derive(Clone)]
pub struct DependencyKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl DependencyKey {
    /// Creates a key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Returns the [`TypeId`] of this capability type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the shortened type name used in error messages.
    pub fn short_name(&self) -> String {
        shorten_type_name(self.type_name)
    }
}

// Equality and hashing go through TypeId only; the stored name is
// display metadata.
impl PartialEq for DependencyKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for DependencyKey {}

impl Hash for DependencyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DependencyKey({})", self.type_name)
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// A named-binding lookup key.
///
/// Carries the binding name and, when known, the capability type the
/// requesting site declared. The declared type plays no part in lookup;
/// it only improves error messages.
///
/// # Examples
/// ```
/// use vessel_container::key::Key;
///
/// let plain = Key::new("database_url");
/// assert_eq!(plain.name(), "database_url");
///
/// let typed = Key::typed::<String>("database_url");
/// assert!(typed.declared().is_some());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    name: String,
    declared: Option<DependencyKey>,
}

impl Key {
    /// Creates a key for a named binding.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared: None,
        }
    }

    /// Creates a key that also records the declared capability type.
    pub fn typed<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared: Some(DependencyKey::of::<T>()),
        }
    }

    /// Returns the binding name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared capability type, if any.
    #[inline]
    pub fn declared(&self) -> Option<&DependencyKey> {
        self.declared.as_ref()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.declared {
            Some(declared) => write!(f, "\"{}\" ({})", self.name, declared),
            None => write!(f, "\"{}\"", self.name),
        }
    }
}
