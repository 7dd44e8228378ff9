use crate::{
    errors::ResolveError,
    resolver::lazy::LazyTarget,
    types::{DependencyInfo, Instance},
};

pub mod arc;
pub mod lazy;

/// A value handed to a constructor, property setter or injected method
#[derive(Debug, Clone)]
pub enum Argument {
    /// The dependency was resolved
    Resolved(Instance),
    /// The dependency is bound lazily and has not been resolved
    Lazy(LazyTarget),
    /// An optional dependency that is not registered
    Missing,
    /// The parameter is left to the constructor's own default
    Default,
}

/// Allows custom behaviour on injection
///
/// Describes what a parameter depends on, and how the resolved [Argument] is turned back into
/// the typed value the constructor receives.
pub trait Resolver {
    fn dependency_info() -> DependencyInfo;

    fn from_argument(argument: Argument) -> Result<Self, ResolveError>
    where
        Self: Sized;
}
