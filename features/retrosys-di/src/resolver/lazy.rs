use std::{any::type_name, fmt::Debug, sync::Arc};

use parking_lot::Mutex;

use crate::{
    container::DiContainer,
    errors::ResolveError,
    resolver::{arc::downcast_instance, Argument, Resolver},
    types::{DependencyInfo, Injectable, TypeInfo},
};

/// What a lazy handle will resolve once it is invoked
#[derive(Clone)]
pub struct LazyTarget {
    container: DiContainer,
    service: TypeInfo,
    context_key: String,
}
impl Debug for LazyTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyTarget")
            .field("service", &self.service.type_name)
            .field("context_key", &self.context_key)
            .finish()
    }
}
impl LazyTarget {
    pub(crate) fn new(container: DiContainer, service: TypeInfo, context_key: &str) -> Self {
        LazyTarget {
            container,
            service,
            context_key: context_key.to_string(),
        }
    }

    pub fn service(&self) -> TypeInfo {
        self.service
    }
}

/// Lazily resolved dependency
///
/// Holds on to the container it was created from and resolves the service the first time it is
/// invoked. The result is memoized: later invocations return the same instance without touching
/// the container again, even if the container's registrations have changed in the meantime.
///
/// Constructing a service that depends on `Lazy<T>` never constructs `T`.
pub struct Lazy<T: ?Sized + Injectable>(Arc<LazyInner<T>>);
struct LazyInner<T: ?Sized + Injectable> {
    target: LazyTarget,
    resolved: Mutex<Option<Arc<T>>>,
}
impl<T: ?Sized + Injectable> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Lazy(self.0.clone())
    }
}
impl<T: ?Sized + Injectable + Debug> Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.resolved.lock().as_ref() {
            Some(instance) => f.debug_tuple("Lazy").field(instance).finish(),
            None => f.debug_tuple("Lazy").field(&"<unresolved>").finish(),
        }
    }
}

impl<T: ?Sized + Injectable> Resolver for Lazy<T> {
    fn dependency_info() -> DependencyInfo {
        DependencyInfo {
            lazy: true,
            ..DependencyInfo::of::<T>()
        }
    }

    fn from_argument(argument: Argument) -> Result<Self, ResolveError> {
        match argument {
            Argument::Lazy(target) => Ok(Lazy::new(target)),
            _ => Err(ResolveError::DowncastFailed {
                required_type: type_name::<Self>(),
                actual_type: "eagerly resolved argument",
            }),
        }
    }
}

impl<T: ?Sized + Injectable> Lazy<T> {
    pub(crate) fn new(target: LazyTarget) -> Self {
        Lazy(Arc::new(LazyInner {
            target,
            resolved: Mutex::new(None),
        }))
    }

    /// Resolves the dependency on first use, without suspending
    ///
    /// Fails with [ResolveError::AsyncInitialization] if the target is async.
    pub fn invoke(&self) -> Result<Arc<T>, ResolveError> {
        if let Some(instance) = self.get() {
            return Ok(instance);
        }

        let target = &self.0.target;
        let instance = target
            .container
            .resolve_instance(target.service, &target.context_key)?;
        let resolved = downcast_instance::<T>(&instance)?;

        Ok(self.store(resolved))
    }

    /// Resolves the dependency on first use, suspending where the target requires it
    pub async fn resolve_async(&self) -> Result<Arc<T>, ResolveError> {
        if let Some(instance) = self.get() {
            return Ok(instance);
        }

        let target = &self.0.target;
        let instance = target
            .container
            .resolve_instance_async(target.service, target.context_key.clone())
            .await?;
        let resolved = downcast_instance::<T>(&instance)?;

        Ok(self.store(resolved))
    }

    /// Returns the memoized instance, if the handle was already invoked
    pub fn get(&self) -> Option<Arc<T>> {
        self.0.resolved.lock().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.0.resolved.lock().is_some()
    }

    // First writer wins, so concurrent invocations agree on one instance
    fn store(&self, resolved: Arc<T>) -> Arc<T> {
        let mut slot = self.0.resolved.lock();
        slot.get_or_insert(resolved).clone()
    }
}
