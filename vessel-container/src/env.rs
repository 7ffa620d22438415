//! Environment-driven context selection.
//!
//! Deployments that assemble one [`Context`] per environment (local,
//! staging, production) pick between them with an environment variable:
//!
//! ```no_run
//! use vessel_container::context::Context;
//! use vessel_container::env::match_environment;
//!
//! let local = Context::empty();
//! let production = Context::empty();
//!
//! let context = match_environment(
//!     "APP_ENVIRONMENT",
//!     Some("local"),
//!     [("local", &local), ("production", &production)],
//! )
//! .expect("known environment");
//! let _guard = context.enter();
//! ```

use tracing::debug;

use crate::context::Context;
use crate::error::{Result, UnknownEnvironmentError, VesselError};

/// Selects a context by the value of `variable`.
///
/// When the variable is unset, `default` names the environment to fall
/// back to.
///
/// # Errors
/// [`VesselError::UnknownEnvironment`] when the selected name matches
/// no supplied environment, or when the variable is unset and there is
/// no default.
pub fn match_environment<'a>(
    variable: &str,
    default: Option<&str>,
    environments: impl IntoIterator<Item = (&'a str, &'a Context)>,
) -> Result<Context> {
    let value = std::env::var(variable).ok();
    select(value.as_deref(), default, environments)
}

fn select<'a>(
    value: Option<&str>,
    default: Option<&str>,
    environments: impl IntoIterator<Item = (&'a str, &'a Context)>,
) -> Result<Context> {
    let Some(name) = value.or(default) else {
        return Err(VesselError::UnknownEnvironment(UnknownEnvironmentError {
            selector: None,
        }));
    };

    for (candidate, context) in environments {
        if candidate == name {
            debug!(environment = name, "Matched environment");
            return Ok(context.clone());
        }
    }
    Err(VesselError::UnknownEnvironment(UnknownEnvironmentError {
        selector: Some(name.to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency;

    struct LocalDb;
    struct ProductionDb;
    dependency!(LocalDb = || Ok(LocalDb));
    dependency!(ProductionDb = || Ok(ProductionDb));

    fn environments() -> (Context, Context) {
        let local = Context::builder().register::<LocalDb>().build().unwrap();
        let production = Context::builder()
            .register::<ProductionDb>()
            .build()
            .unwrap();
        (local, production)
    }

    #[test]
    fn value_selects_environment() {
        let (local, production) = environments();
        let pairs = [("local", &local), ("production", &production)];
        let context = select(Some("production"), None, pairs).unwrap();
        assert!(context.contains::<ProductionDb>());
        assert!(!context.contains::<LocalDb>());
    }

    #[test]
    fn default_applies_when_unset() {
        let (local, production) = environments();
        let pairs = [("local", &local), ("production", &production)];
        let context = select(None, Some("local"), pairs).unwrap();
        assert!(context.contains::<LocalDb>());
    }

    #[test]
    fn value_beats_default() {
        let (local, production) = environments();
        let pairs = [("local", &local), ("production", &production)];
        let context = select(Some("production"), Some("local"), pairs).unwrap();
        assert!(context.contains::<ProductionDb>());
    }

    #[test]
    fn unknown_name_is_an_error() {
        let (local, production) = environments();
        let pairs = [("local", &local), ("production", &production)];
        match select(Some("staging"), None, pairs) {
            Err(VesselError::UnknownEnvironment(err)) => {
                assert_eq!(err.selector.as_deref(), Some("staging"));
            }
            other => panic!("expected unknown environment, got {other:?}"),
        }
    }

    #[test]
    fn unset_without_default_is_an_error() {
        let (local, _) = environments();
        match select(None, None, [("local", &local)]) {
            Err(VesselError::UnknownEnvironment(err)) => assert!(err.selector.is_none()),
            other => panic!("expected unknown environment, got {other:?}"),
        }
    }

    #[test]
    fn unset_variable_falls_back_to_default() {
        let (local, _) = environments();
        let context = match_environment(
            "VESSEL_TEST_ENV_THAT_IS_NEVER_SET",
            Some("local"),
            [("local", &local)],
        )
        .unwrap();
        assert!(context.contains::<LocalDb>());
    }
}
