use std::{any::type_name, ops::Deref, sync::Arc};

use retrosys_di::{
    errors::ResolveError,
    resolver::{Argument, Resolver},
    types::{DependencyInfo, Instance},
};

use crate::provider::ConfigProvider;

/// Constructor parameter that injects one config section
///
/// The declared dependency is the [ConfigProvider]. The section itself is pulled out of it
/// when the argument is taken, so a missing section fails the resolution that asked for it.
pub struct Config<T> {
    inner: Arc<T>,
}
impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Config {
            inner: self.inner.clone(),
        }
    }
}
impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Send + Sync + 'static> Config<T> {
    fn from_provider(instance: &Instance) -> Result<Self, ResolveError> {
        let provider = instance
            .downcast::<ConfigProvider>()
            .map_err(|actual_type| ResolveError::DowncastFailed {
                required_type: type_name::<ConfigProvider>(),
                actual_type,
            })?;

        Ok(Config {
            inner: provider.require_config::<T>()?,
        })
    }
}

impl<T: Send + Sync + 'static> Resolver for Config<T> {
    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<ConfigProvider>()
    }

    fn from_argument(argument: Argument) -> Result<Self, ResolveError> {
        match argument {
            Argument::Resolved(instance) => Self::from_provider(&instance),
            _ => Err(ResolveError::DowncastFailed {
                required_type: type_name::<Self>(),
                actual_type: "unresolved argument",
            }),
        }
    }
}
