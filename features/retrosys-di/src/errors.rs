use std::sync::Arc;

use thiserror::Error;

use crate::types::{DynError, TypeInfo};

/// Errors while resolving a service
///
/// All variants are fatal to the resolution call that produced them and are never retried.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// A service appeared again in its own ancestor chain
    #[error("Circular dependency detected: {}", display_chain(.chain))]
    CircularDependency {
        /// Resolution order, ending with the repeated service
        chain: Vec<TypeInfo>,
    },

    /// No mock, registration, module or auto registration provides the service
    #[error("No registration found for '{service}'{}", display_context_key(.context_key))]
    DependencyNotFound {
        service: TypeInfo,
        context_key: String,
    },

    /// An async service was reached through the non-suspending entry point
    #[error(
        "Service '{service}' is async and must be resolved with resolve_async{}",
        display_required_by(.required_by)
    )]
    AsyncInitialization {
        service: TypeInfo,
        required_by: Option<TypeInfo>,
    },

    /// A constructor parameter has neither a declared type nor a default
    #[error("Cannot resolve parameter '{parameter}' for '{implementation}' without a declared type")]
    Construction {
        implementation: TypeInfo,
        parameter: &'static str,
    },

    /// A constructor or method asked for an argument it never declared
    #[error("Parameter '{parameter}' of '{implementation}' was not declared or already taken")]
    MissingArgument {
        implementation: TypeInfo,
        parameter: String,
    },

    /// A factory or constructor returned an error
    #[error("Factory for '{service}' failed - error: {error}")]
    FactoryFailed {
        service: TypeInfo,
        error: Arc<DynError>,
    },

    /// A lifecycle hook or injected method returned an error
    #[error("Hook '{hook}' of '{service}' failed - error: {error}")]
    HookFailed {
        service: TypeInfo,
        hook: String,
        error: Arc<DynError>,
    },

    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },

    /// The scope was used after it was disposed
    #[error("The scope has already been disposed")]
    ScopeClosed,

    /// Generic error raised by a custom resolver
    #[error("Error during injection: {0}")]
    Other(Arc<DynError>),
}

impl ResolveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::DependencyNotFound { .. })
    }

    pub fn is_circular(&self) -> bool {
        matches!(self, ResolveError::CircularDependency { .. })
    }

    pub fn is_async_initialization(&self) -> bool {
        matches!(self, ResolveError::AsyncInitialization { .. })
    }

    pub fn other(error: impl Into<DynError>) -> Self {
        ResolveError::Other(Arc::new(error.into()))
    }

    /// Converts an error returned by user code building `service`
    ///
    /// Resolution errors raised by nested resolutions are passed through unmodified.
    pub(crate) fn from_factory(service: TypeInfo, error: DynError) -> Self {
        match error.downcast::<ResolveError>() {
            Ok(resolve_error) => *resolve_error,
            Err(error) => ResolveError::FactoryFailed {
                service,
                error: Arc::new(error),
            },
        }
    }

    pub(crate) fn from_hook(service: TypeInfo, hook: &str, error: DynError) -> Self {
        match error.downcast::<ResolveError>() {
            Ok(resolve_error) => *resolve_error,
            Err(error) => ResolveError::HookFailed {
                service,
                hook: hook.to_string(),
                error: Arc::new(error),
            },
        }
    }
}

fn display_chain(chain: &[TypeInfo]) -> String {
    chain
        .iter()
        .map(|info| info.type_name)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn display_context_key(context_key: &str) -> String {
    if context_key.is_empty() {
        String::new()
    } else {
        format!(" with context key '{context_key}'")
    }
}

fn display_required_by(required_by: &Option<TypeInfo>) -> String {
    match required_by {
        Some(parent) => format!(" (required by '{parent}')"),
        None => String::new(),
    }
}
