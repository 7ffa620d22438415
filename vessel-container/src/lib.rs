//! Vessel container — scoped dependency resolution.
//!
//! Types opt in as *capability types* with the [`dependency!`] macro,
//! which declares an ancestor chain, a lifecycle, a constructor and
//! optionally a stand-in for tests. A [`Context`](context::Context)
//! collects capability types and named values; entering it makes it the
//! active scope of the current thread, and
//! [`resolve`](resolver::resolve) / [`provide`](resolver::provide)
//! answer requests against that scope.
//!
//! ```
//! use vessel_container::prelude::*;
//!
//! struct Log;
//! struct ConsoleLog;
//!
//! dependency!(abstract Log);
//! dependency!(ConsoleLog extends [Log] = || Ok(ConsoleLog));
//!
//! let context = Context::builder()
//!     .register::<ConsoleLog>()
//!     .named("app_name", String::from("vessel-demo"))
//!     .build()
//!     .expect("valid context");
//!
//! let _guard = context.enter();
//! let log = provide_type::<Log>().expect("registered");
//! assert!(log.downcast::<ConsoleLog>().is_ok());
//! ```

pub mod binder;
pub mod context;
pub mod descriptor;
pub mod env;
pub mod error;
pub mod key;
mod registry;
pub mod resolver;
pub mod state;

// Re-exported for the `dependency!` macro expansion.
#[doc(hidden)]
pub use once_cell;

pub use crate::binder::{Binder, BoundFields, argument, named_argument};
pub use crate::context::{
    Context, ContextBuilder, ContextGuard, mock, mock_named, mock_with,
};
pub use crate::descriptor::{
    BoxError, ConstructFn, Dependency, Descriptor, DescriptorBuilder, Instance,
    Lifecycle, ParamBinding, ParamSpec, erase,
};
pub use crate::env::match_environment;
pub use crate::error::{
    AmbiguousError, CircularError, Result, UnknownEnvironmentError, VesselError,
};
pub use crate::key::{DependencyKey, Key};
pub use crate::resolver::{
    Request, RequestTarget, provide, provide_named, provide_type, resolve,
};
pub use crate::state::{OwnerId, OwnerRef};

/// One-stop imports for typical use.
pub mod prelude {
    pub use crate::binder::{Binder, argument, named_argument};
    pub use crate::context::{Context, mock, mock_named, mock_with};
    pub use crate::dependency;
    pub use crate::descriptor::{Dependency, Instance, erase};
    pub use crate::env::match_environment;
    pub use crate::error::{Result, VesselError};
    pub use crate::key::DependencyKey;
    pub use crate::resolver::{Request, provide, provide_named, provide_type, resolve};
    pub use crate::state::OwnerRef;
}
