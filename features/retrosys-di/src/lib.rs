//! Retrosys DI is a dependency injection container for sync and async Rust.
//!
//! Services are registered under an identity (a type, or a `dyn Trait`) together with a recipe
//! for building them, and resolved on demand with their dependencies wired in.
//!
//! The main parts are:
//!
//! 1. Registration - a typed builder describing how a service is constructed, its lifecycle,
//!    context key, property and method injections and lifecycle hooks
//! 2. DiContainer - the registry, singleton cache, test mode and resolution entry point
//! 3. Scope - per unit-of-work caching of scoped services, with ordered teardown
//! 4. Module - named groups of registrations imported into a container
//! 5. Lazy - dependencies resolved on first use, which is also how cycles are broken
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use retrosys_di::{Arguments, DiContainer, DynError, Parameter, Registration};
//!
//! struct Logger;
//! struct Service {
//!     logger: Arc<Logger>,
//! }
//!
//! let container = DiContainer::new();
//! container
//!     .register(Registration::factory(|_| Ok(Logger)))
//!     .register(
//!         Registration::constructor(
//!             vec![Parameter::of::<Arc<Logger>>("logger")],
//!             |args: &mut Arguments| -> Result<Service, DynError> {
//!                 Ok(Service {
//!                     logger: args.take("logger")?,
//!                 })
//!             },
//!         )
//!         .transient(),
//!     );
//!
//! let first = container.resolve::<Service>().unwrap();
//! let second = container.resolve::<Service>().unwrap();
//! assert!(!Arc::ptr_eq(&first, &second));
//! assert!(Arc::ptr_eq(&first.logger, &second.logger));
//! ```

pub mod builder;
pub mod container;
pub mod declaration;
pub mod dependency_graph;
pub mod descriptor;
pub mod dispose;
pub mod errors;
pub mod factories;
pub mod module;
pub mod resolution;
pub mod resolver;
pub mod scope;
pub mod types;

pub use builder::Registration;
pub use container::DiContainer;
pub use declaration::Declared;
pub use dependency_graph::{DependencyGraph, DependencyGraphError, DependencyGraphErrors};
pub use descriptor::{Lifecycle, ResolutionStrategy, ServiceDescriptor};
pub use dispose::{AsyncDispose, Dispose};
pub use errors::ResolveError;
pub use factories::{Arguments, AsyncComponent, Component, Parameter, ParameterKind};
pub use module::Module;
pub use resolution::DiHandle;
pub use resolver::{lazy::Lazy, Argument, Resolver};
pub use scope::Scope;
pub use types::{DependencyInfo, DynError, Injectable, Instance, TypeInfo};
