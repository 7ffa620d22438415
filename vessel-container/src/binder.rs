//! Field and argument binding on top of the resolver.
//!
//! A [`Binder`] describes the dependencies one owner wants as named
//! fields, resolves them in one pass against the active scope, and
//! hands back [`BoundFields`]. Resolution failures do not abort the
//! bind: each field captures its own outcome, and a failure surfaces
//! only when that field is read. An owner whose failing dependencies
//! are never touched works fine.
//!
//! Caller-supplied values take precedence: a field overridden with
//! [`Binder::override_with`] never consults the scope at all.
//!
//! For free functions, [`argument`] and [`named_argument`] resolve a
//! single parameter attributed to the function's name, so repeated
//! calls within a scope share instance-lifecycle values.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{Dependency, Instance, erase};
use crate::error::{Result, VesselError};
use crate::key::DependencyKey;
use crate::resolver::{Request, provide};
use crate::state::OwnerRef;

/// Declares and resolves the dependency fields of one owner.
///
/// Duplicate names follow the first declaration: declare the most
/// derived layer's fields first, then any layers it builds on, and an
/// already-declared name in a later layer is skipped.
pub struct Binder {
    owner: OwnerRef,
    fields: Vec<(String, Request)>,
    overrides: HashMap<String, Instance>,
}

impl Binder {
    /// Starts a binder for `owner`. Instance-lifecycle fields bound
    /// here are cached per owner for as long as the owner lives.
    pub fn for_owner(owner: OwnerRef) -> Self {
        Self {
            owner,
            fields: Vec::new(),
            overrides: HashMap::new(),
        }
    }

    /// Declares field `name`, resolved as capability type `T`.
    pub fn field<T: Dependency>(mut self, name: impl Into<String>) -> Self {
        self.fields.push((name.into(), Request::capability::<T>()));
        self
    }

    /// Declares field `name`, resolved as the named binding `key`.
    pub fn named_field(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.fields.push((name.into(), Request::named(key.into())));
        self
    }

    /// Supplies field `name` directly. An overridden field is never
    /// resolved.
    pub fn override_with(mut self, name: impl Into<String>, value: impl Any + Send + Sync) -> Self {
        self.overrides.insert(name.into(), erase(value));
        self
    }

    /// Resolves every declared field against the active scope.
    ///
    /// Never fails as a whole: each field stores its own outcome and a
    /// failing field re-surfaces its error on read.
    pub fn bind(self) -> BoundFields {
        let mut entries = HashMap::new();
        for (name, request) in self.fields {
            if entries.contains_key(&name) {
                continue;
            }
            let outcome = match self.overrides.get(&name) {
                Some(value) => Ok(Arc::clone(value)),
                None => {
                    let request = request
                        .binding(name.clone())
                        .owner(self.owner.clone());
                    provide(&request)
                }
            };
            if let Err(err) = &outcome {
                debug!(field = %name, owner = %self.owner.name(), error = %err, "Field binding deferred an error");
            }
            entries.insert(name, Binding { outcome });
        }
        BoundFields { entries }
    }
}

/// The resolved fields of one owner.
pub struct BoundFields {
    entries: HashMap<String, Binding>,
}

impl BoundFields {
    /// Reads field `name`, surfacing any error captured at bind time.
    ///
    /// # Errors
    /// [`VesselError::NoNamedBinding`] for an undeclared field; the
    /// stored resolution error for a field that failed to bind.
    pub fn get(&self, name: &str) -> Result<Instance> {
        match self.entries.get(name) {
            Some(binding) => binding.get(),
            None => Err(VesselError::NoNamedBinding {
                name: name.to_string(),
            }),
        }
    }

    /// Reads field `name` downcast to `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.get(name)?
            .downcast::<T>()
            .map_err(|_| VesselError::InvalidDependency {
                reason: format!(
                    "field \"{name}\" is not a {}",
                    DependencyKey::of::<T>()
                ),
            })
    }

    /// True iff the field is declared, whether or not it bound cleanly.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// True iff the field is declared and bound without error.
    pub fn is_bound(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|b| b.outcome.is_ok())
    }

    /// Declared field names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// One bound field: the instance, or the error captured while binding.
struct Binding {
    outcome: Result<Instance>,
}

impl Binding {
    fn get(&self) -> Result<Instance> {
        match &self.outcome {
            Ok(instance) => Ok(Arc::clone(instance)),
            Err(err) => Err(err.clone()),
        }
    }
}

/// Resolves one function parameter as capability type `T`, attributed
/// to `function` so instance-lifecycle values are shared across calls
/// within a scope.
pub fn argument<T: Dependency>(
    function: &'static str,
    param: impl Into<String>,
) -> Result<Instance> {
    provide(
        &Request::capability::<T>()
            .binding(param)
            .owner(OwnerRef::callable(function)),
    )
}

/// Resolves one function parameter as the named binding `key`.
pub fn named_argument(function: &'static str, key: impl Into<String>) -> Result<Instance> {
    provide(&Request::named(key).owner(OwnerRef::callable(function)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::dependency;

    struct Log;
    struct ConsoleLog;
    dependency!(abstract Log);
    dependency!(ConsoleLog extends [Log] = || Ok(ConsoleLog));

    fn test_context() -> Context {
        Context::builder()
            .register::<ConsoleLog>()
            .named("db_url", String::from("sqlite://"))
            .build()
            .unwrap()
    }

    #[test]
    fn binds_capability_and_named_fields() {
        let context = test_context();
        let _guard = context.enter();

        let owner = Arc::new(0u8);
        let fields = Binder::for_owner(OwnerRef::object(&owner))
            .field::<Log>("log")
            .named_field("url", "db_url")
            .bind();

        assert!(fields.get("log").unwrap().downcast::<ConsoleLog>().is_ok());
        assert_eq!(
            *fields.get_as::<String>("url").unwrap(),
            String::from("sqlite://")
        );
    }

    struct Ghost;
    dependency!(abstract Ghost);

    #[test]
    fn failing_field_defers_its_error() {
        let context = test_context();
        let _guard = context.enter();

        let owner = Arc::new(0u8);
        let fields = Binder::for_owner(OwnerRef::object(&owner))
            .field::<Log>("log")
            .field::<Ghost>("ghost")
            .bind();

        // the healthy field is unaffected
        assert!(fields.get("log").is_ok());
        assert!(fields.is_bound("log"));
        assert!(!fields.is_bound("ghost"));

        // the failing field surfaces its error on every read
        assert!(matches!(
            fields.get("ghost"),
            Err(VesselError::Unregistered { .. })
        ));
        assert!(matches!(
            fields.get("ghost"),
            Err(VesselError::Unregistered { .. })
        ));
    }

    #[test]
    fn override_beats_resolution() {
        let context = test_context();
        let _guard = context.enter();

        struct StubLog;
        let owner = Arc::new(0u8);
        let fields = Binder::for_owner(OwnerRef::object(&owner))
            .field::<Log>("log")
            .override_with("log", StubLog)
            .bind();

        assert!(fields.get("log").unwrap().downcast::<StubLog>().is_ok());
    }

    #[test]
    fn first_declaration_wins_for_duplicate_names() {
        let context = test_context();
        let _guard = context.enter();

        // derived layer declares "log" as a capability; a base layer
        // declaring the same name as a named binding is skipped
        let owner = Arc::new(0u8);
        let fields = Binder::for_owner(OwnerRef::object(&owner))
            .field::<Log>("log")
            .named_field("log", "db_url")
            .bind();

        assert!(fields.get("log").unwrap().downcast::<ConsoleLog>().is_ok());
    }

    #[test]
    fn override_works_without_registration() {
        let context = Context::empty();
        let _guard = context.enter();

        struct StubLog;
        let owner = Arc::new(0u8);
        let fields = Binder::for_owner(OwnerRef::object(&owner))
            .field::<Log>("log")
            .override_with("log", StubLog)
            .bind();

        assert!(fields.get("log").is_ok());
    }

    #[test]
    fn undeclared_field_errors() {
        let context = test_context();
        let _guard = context.enter();

        let owner = Arc::new(0u8);
        let fields = Binder::for_owner(OwnerRef::object(&owner)).bind();
        assert!(!fields.contains("log"));
        assert!(fields.get("log").is_err());
    }

    struct Chicken;
    struct Egg;
    dependency!(Chicken requires [egg: Egg] = || {
        provide(&Request::capability::<Egg>().binding("egg"))?;
        Ok(Chicken)
    });
    dependency!(Egg requires [chicken: Chicken] = || {
        provide(&Request::capability::<Chicken>().binding("chicken"))?;
        Ok(Egg)
    });

    #[test]
    fn circular_field_binding_surfaces_on_read() {
        let context = Context::builder()
            .register::<Chicken>()
            .register::<Egg>()
            .build()
            .unwrap();
        let _guard = context.enter();

        let owner = Arc::new(0u8);
        let fields = Binder::for_owner(OwnerRef::object(&owner))
            .field::<Chicken>("chicken")
            .bind();
        assert!(matches!(
            fields.get("chicken"),
            Err(VesselError::Circular(_))
        ));
    }

    #[test]
    fn rebinding_same_owner_shares_instances() {
        let context = test_context();
        let _guard = context.enter();

        let owner = Arc::new(0u8);
        let first = Binder::for_owner(OwnerRef::object(&owner))
            .field::<Log>("log")
            .bind();
        let second = Binder::for_owner(OwnerRef::object(&owner))
            .field::<Log>("log")
            .bind();

        assert!(Arc::ptr_eq(
            &first.get("log").unwrap(),
            &second.get("log").unwrap()
        ));
    }

    #[test]
    fn get_as_rejects_wrong_type() {
        let context = test_context();
        let _guard = context.enter();

        let owner = Arc::new(0u8);
        let fields = Binder::for_owner(OwnerRef::object(&owner))
            .named_field("url", "db_url")
            .bind();
        assert!(matches!(
            fields.get_as::<i32>("url"),
            Err(VesselError::InvalidDependency { .. })
        ));
    }

    #[test]
    fn function_arguments_share_per_callable() {
        let context = test_context();
        let _guard = context.enter();

        let first = argument::<Log>("handle_request", "log").unwrap();
        let second = argument::<Log>("handle_request", "log").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let elsewhere = argument::<Log>("other_function", "log").unwrap();
        assert!(!Arc::ptr_eq(&first, &elsewhere));

        let url = named_argument("handle_request", "db_url").unwrap();
        assert_eq!(*url.downcast::<String>().unwrap(), String::from("sqlite://"));
    }
}
