use std::{
    fmt::Debug,
    future::Future,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;

use crate::{
    builder::Registration,
    container::{DiContainer, DiContainerInner},
    descriptor::{Lifecycle, ServiceDescriptor},
    errors::ResolveError,
    factories::Component,
    resolution::DiHandle,
    types::{DynError, Injectable, TypeInfo},
};

/// A named group of registrations that can be imported into other containers
///
/// A module owns its own container. Once imported with
/// [DiContainer::register_module], the importing container finds the module's registrations
/// after its own, and the module falls back to the importing container for anything it does
/// not provide itself.
///
/// Resolving directly on a module never fails: anything that cannot be resolved (locally or
/// through the parent) yields `None`, with the reason logged at debug level.
#[derive(Clone)]
pub struct Module(Arc<ModuleInner>);
struct ModuleInner {
    name: String,
    container: DiContainer,
    parent: RwLock<Option<Weak<DiContainerInner>>>,
}
impl Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.0.name)
            .field("container", &self.0.container)
            .field("attached", &self.parent().is_some())
            .finish()
    }
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module(Arc::new(ModuleInner {
            name: name.into(),
            container: DiContainer::new(),
            parent: RwLock::new(None),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn container(&self) -> &DiContainer {
        &self.0.container
    }

    /// The container this module was last imported into, while it is alive
    pub fn parent(&self) -> Option<DiContainer> {
        self.0
            .parent
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(DiContainer)
    }

    pub(crate) fn attach(&self, parent: &DiContainer) {
        *self.0.parent.write() = Some(Arc::downgrade(&parent.0));
    }

    pub(crate) fn get_descriptor(
        &self,
        service: TypeInfo,
        context_key: &str,
    ) -> Option<Arc<ServiceDescriptor>> {
        self.0.container.get_descriptor(service, context_key)
    }
}

// Registration surface, same as the container's
impl Module {
    pub fn register<I: Injectable>(&self, registration: Registration<I>) -> &Self {
        self.0.container.register(registration);
        self
    }

    pub fn register_instance<T: ?Sized + Injectable>(&self, instance: Arc<T>) -> &Self {
        self.0.container.register_instance(instance);
        self
    }

    pub fn register_factory<I, F>(&self, factory: F, lifecycle: Lifecycle) -> &Self
    where
        I: Injectable,
        F: Fn(&DiHandle) -> Result<I, DynError> + Send + Sync + 'static,
    {
        self.0.container.register_factory(factory, lifecycle);
        self
    }

    pub fn register_async_factory<I, F, Fut>(&self, factory: F, lifecycle: Lifecycle) -> &Self
    where
        I: Injectable,
        F: Fn(DiHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<I, DynError>> + Send + 'static,
    {
        self.0.container.register_async_factory(factory, lifecycle);
        self
    }

    pub fn register_component<I: Component>(&self, lifecycle: Lifecycle) -> &Self {
        self.0.container.register_component::<I>(lifecycle);
        self
    }
}

// Resolution
impl Module {
    pub fn resolve<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        self.resolve_keyed::<T>("")
    }

    pub fn resolve_keyed<T: ?Sized + Injectable>(&self, context_key: &str) -> Option<Arc<T>> {
        let local = self.0.container.resolve_keyed::<T>(context_key);
        self.fallback(local, |parent| parent.resolve_keyed::<T>(context_key))
    }

    pub async fn resolve_async<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        self.resolve_keyed_async::<T>("").await
    }

    pub async fn resolve_keyed_async<T: ?Sized + Injectable>(
        &self,
        context_key: &str,
    ) -> Option<Arc<T>> {
        let local_error = match self.0.container.resolve_keyed_async::<T>(context_key).await {
            Ok(instance) => return Some(instance),
            Err(error) => error,
        };

        let parent = self.parent_after::<T>(&local_error)?;
        match parent.resolve_keyed_async::<T>(context_key).await {
            Ok(instance) => Some(instance),
            Err(error) => {
                self.log_unresolved::<T>(&error);
                None
            }
        }
    }

    fn fallback<T: ?Sized + Injectable>(
        &self,
        local: Result<Arc<T>, ResolveError>,
        from_parent: impl FnOnce(&DiContainer) -> Result<Arc<T>, ResolveError>,
    ) -> Option<Arc<T>> {
        let local_error = match local {
            Ok(instance) => return Some(instance),
            Err(error) => error,
        };

        let parent = self.parent_after::<T>(&local_error)?;
        match from_parent(&parent) {
            Ok(instance) => Some(instance),
            Err(error) => {
                self.log_unresolved::<T>(&error);
                None
            }
        }
    }

    /// The parent to fall back to after a local failure, if there is one
    fn parent_after<T: ?Sized + Injectable>(&self, local_error: &ResolveError) -> Option<DiContainer> {
        tracing::debug!(
            "Module '{}' could not resolve {}: {}",
            self.0.name,
            TypeInfo::of::<T>(),
            local_error
        );

        let parent = self.parent();
        if parent.is_none() {
            self.log_unresolved::<T>(local_error);
        }
        parent
    }

    fn log_unresolved<T: ?Sized + Injectable>(&self, error: &ResolveError) {
        tracing::debug!(
            "Module '{}' gives up on {}: {}",
            self.0.name,
            TypeInfo::of::<T>(),
            error
        );
    }
}
