//! Error taxonomy for resolution and declaration failures.
//!
//! Every error is terminal: nothing in the engine retries. The resolver
//! never swallows an error, it only re-wraps construction failures as
//! [`VesselError::Injection`]; the binder stores field failures and
//! re-surfaces them on first read, which is why the whole enum is `Clone`.

use std::fmt;
use std::sync::Arc;

use vessel_support::rendering::render_candidates;

use crate::key::DependencyKey;

/// Main error type for all Vessel operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VesselError {
    /// Declaration-time misuse: a malformed capability descriptor or
    /// context construction argument.
    #[error("Invalid dependency declaration: {reason}")]
    InvalidDependency { reason: String },

    /// An abstract capability type was requested with no registered
    /// implementation.
    #[error("No concrete implementation of {requested} found\n  Hint: register a concrete subtype of {requested} in the Context")]
    Unregistered { requested: DependencyKey },

    /// Resolution was requested outside any entered context.
    #[error("No active context: enter a Context before resolving dependencies")]
    NoActiveContext,

    /// Two or more registered implementations tied for greatest
    /// specificity.
    #[error("{}", .0)]
    Ambiguous(AmbiguousError),

    /// A type was requested while already mid-construction in the same
    /// resolution chain.
    #[error("{}", .0)]
    Circular(CircularError),

    /// A named lookup found neither an override nor a registered value.
    #[error("Named binding \"{name}\" not found in the active context\n  Hint: pass the value to Context::builder().named(\"{name}\", ...)")]
    NoNamedBinding { name: String },

    /// Constructing an implementation failed; carries the original cause
    /// and identifies the capability, binding name and owner.
    #[error("Could not instantiate {key} when injecting \"{binding}\" in {owner}: {source}")]
    Injection {
        key: DependencyKey,
        binding: String,
        owner: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The environment matcher found no matching context.
    #[error("{}", .0)]
    UnknownEnvironment(UnknownEnvironmentError),
}

/// Error when multiple equally specific implementations are registered.
#[derive(Debug, Clone)]
pub struct AmbiguousError {
    /// The capability type that was requested.
    pub requested: DependencyKey,
    /// The implementations tied for greatest specificity.
    pub candidates: Vec<DependencyKey>,
}

impl fmt::Display for AmbiguousError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .candidates
            .iter()
            .map(|k| k.type_name())
            .collect();
        write!(
            f,
            "Attempt to inject type {} with equally specific provided subtypes: {}",
            self.requested,
            render_candidates(&names),
        )?;
        write!(
            f,
            "\n  Hint: keep only one of the tied implementations in the Context"
        )
    }
}

/// Error when a capability is requested while it is mid-construction.
#[derive(Debug, Clone)]
pub struct CircularError {
    /// The implementation type that was already pending.
    pub requested: DependencyKey,
    /// The binding name as seen by the requester.
    pub binding: String,
    /// The requesting owner, for diagnostics.
    pub owner: String,
}

impl fmt::Display for CircularError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Circular dependency encountered while injecting {} as \"{}\" in {}",
            self.requested, self.binding, self.owner,
        )
    }
}

/// Error when the environment matcher cannot select a context.
#[derive(Debug, Clone)]
pub struct UnknownEnvironmentError {
    /// The environment-variable value, or `None` when the variable was
    /// unset and no default context was supplied.
    pub selector: Option<String>,
}

impl fmt::Display for UnknownEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Some(name) => write!(f, "Unknown environment: \"{name}\""),
            None => write!(f, "No environment specified and no default environment"),
        }
    }
}

/// Convenient Result type for Vessel operations.
pub type Result<T> = std::result::Result<T, VesselError>;
