use std::{any::Any, fmt::Debug, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    container::DiContainer,
    descriptor::{Lifecycle, ServiceDescriptor},
    errors::ResolveError,
    factories::{Arguments, Hook, Parameter, ParameterKind, Recipe},
    resolver::{
        arc::downcast_instance,
        lazy::{Lazy, LazyTarget},
        Argument,
    },
    scope::ScopeCache,
    types::{DependencyInfo, Injectable, Instance, TypeInfo},
};

/// DI Handle for resolving dependencies from inside a factory or hook.
///
/// A handle belongs to one resolution call. It carries the chain of services currently under
/// construction, which is what cycle detection runs against, so independent calls on the same
/// container never see each other's chain. Resolving through the handle (rather than through
/// the container directly) keeps nested resolutions in the same chain and the same scope.
#[derive(Clone)]
pub struct DiHandle {
    container: DiContainer,
    chain: Vec<TypeInfo>,
    scope: Option<Arc<ScopeCache>>,
}
impl Debug for DiHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiHandle")
            .field("chain", &self.chain)
            .field("scoped", &self.scope.is_some())
            .finish()
    }
}

/// Result of the steps shared by both resolution paths
enum Prepared {
    Ready(Instance),
    Build {
        frame: DiHandle,
        descriptor: Arc<ServiceDescriptor>,
    },
}

impl DiHandle {
    pub(crate) fn new(container: DiContainer, scope: Option<Arc<ScopeCache>>) -> Self {
        DiHandle {
            container,
            chain: Vec::new(),
            scope,
        }
    }

    /// The container this call resolves against
    pub fn container(&self) -> &DiContainer {
        &self.container
    }

    /// Services currently under construction, outermost first
    pub fn chain(&self) -> &[TypeInfo] {
        &self.chain
    }

    pub fn resolve<T: ?Sized + Injectable>(&self) -> Result<Arc<T>, ResolveError> {
        self.resolve_keyed::<T>("")
    }

    pub fn resolve_keyed<T: ?Sized + Injectable>(
        &self,
        context_key: &str,
    ) -> Result<Arc<T>, ResolveError> {
        let instance = self.resolve_instance(TypeInfo::of::<T>(), context_key)?;
        downcast_instance(&instance)
    }

    pub async fn resolve_async<T: ?Sized + Injectable>(&self) -> Result<Arc<T>, ResolveError> {
        self.resolve_keyed_async::<T>("").await
    }

    pub async fn resolve_keyed_async<T: ?Sized + Injectable>(
        &self,
        context_key: &str,
    ) -> Result<Arc<T>, ResolveError> {
        let instance = self
            .resolve_instance_async(TypeInfo::of::<T>(), context_key.to_string())
            .await?;
        downcast_instance(&instance)
    }

    /// A lazy handle bound to this call's container
    pub fn lazy<T: ?Sized + Injectable>(&self, context_key: &str) -> Lazy<T> {
        Lazy::new(LazyTarget::new(
            self.container.clone(),
            TypeInfo::of::<T>(),
            context_key,
        ))
    }
}

// Shared steps
impl DiHandle {
    /// Mock short-circuit, cycle check, descriptor lookup and cache short-circuit
    fn prepare(&self, service: TypeInfo, context_key: &str) -> Result<Prepared, ResolveError> {
        if let Some(mock) = self.container.mock_for(service) {
            return Ok(Prepared::Ready(mock));
        }

        if self.scope.as_ref().is_some_and(|scope| scope.is_closed()) {
            return Err(ResolveError::ScopeClosed);
        }

        let frame = self.enter(service)?;
        let descriptor = self.container.find_descriptor(service, context_key)?;

        if let Some(instance) = frame.cached(&descriptor) {
            return Ok(Prepared::Ready(instance));
        }

        Ok(Prepared::Build { frame, descriptor })
    }

    /// Returns a handle one level deeper, failing if the service is already under construction
    fn enter(&self, service: TypeInfo) -> Result<DiHandle, ResolveError> {
        let mut chain = self.chain.clone();
        chain.push(service);

        if self.chain.contains(&service) {
            return Err(ResolveError::CircularDependency { chain });
        }

        Ok(DiHandle {
            container: self.container.clone(),
            chain,
            scope: self.scope.clone(),
        })
    }

    fn cached(&self, descriptor: &Arc<ServiceDescriptor>) -> Option<Instance> {
        match descriptor.lifecycle {
            Lifecycle::Singleton => descriptor.cached_instance(),
            Lifecycle::Scoped => self.scope.as_ref()?.get(descriptor),
            Lifecycle::Transient => None,
        }
    }

    fn store(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
        instance: Instance,
    ) -> Result<Instance, ResolveError> {
        match descriptor.lifecycle {
            Lifecycle::Singleton => Ok(descriptor.store_singleton(instance)),
            Lifecycle::Scoped => match &self.scope {
                Some(scope) => scope.insert_or_get(descriptor, instance),
                None => {
                    tracing::debug!(
                        "Scoped service {} resolved outside of a scope - not cached",
                        descriptor.service
                    );
                    Ok(instance)
                }
            },
            Lifecycle::Transient => Ok(instance),
        }
    }

    fn lazy_argument(&self, info: &DependencyInfo, context_key: &str) -> Argument {
        Argument::Lazy(LazyTarget::new(
            self.container.clone(),
            info.type_info,
            context_key,
        ))
    }

    fn into_argument(
        info: &DependencyInfo,
        resolved: Result<Instance, ResolveError>,
    ) -> Result<Argument, ResolveError> {
        match resolved {
            Ok(instance) => Ok(Argument::Resolved(instance)),
            Err(ResolveError::DependencyNotFound { service, .. })
                if info.optional && service == info.type_info =>
            {
                Ok(Argument::Missing)
            }
            Err(error) => Err(error),
        }
    }

    fn async_initialization(&self, service: TypeInfo) -> ResolveError {
        ResolveError::AsyncInitialization {
            service,
            required_by: self.chain.last().copied(),
        }
    }
}

// Non-suspending path
impl DiHandle {
    pub(crate) fn resolve_instance(
        &self,
        service: TypeInfo,
        context_key: &str,
    ) -> Result<Instance, ResolveError> {
        let (frame, descriptor) = match self.prepare(service, context_key)? {
            Prepared::Ready(instance) => return Ok(instance),
            Prepared::Build { frame, descriptor } => (frame, descriptor),
        };

        // Never block on, or skip, asynchronous construction
        if descriptor.is_async {
            return Err(self.async_initialization(service));
        }

        let _building = match descriptor.lifecycle {
            Lifecycle::Singleton => {
                let guard = descriptor.lock_build();
                if let Some(instance) = descriptor.cached_instance() {
                    return Ok(instance);
                }
                Some(guard)
            }
            _ => None,
        };

        frame.build(&descriptor, service, context_key)
    }

    /// Construct, inject, init and cache, without suspending
    fn build(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
        service: TypeInfo,
        context_key: &str,
    ) -> Result<Instance, ResolveError> {
        tracing::debug!("Resolving {}", service);

        let mut built = match &descriptor.recipe {
            Recipe::Factory(factory) => {
                factory(self).map_err(|error| ResolveError::from_factory(service, error))?
            }
            Recipe::Constructor { parameters, build } => {
                let mut args = self.collect_arguments(descriptor.implementation, parameters, "")?;
                build(&mut args).map_err(|error| ResolveError::from_factory(service, error))?
            }
            Recipe::Instance => {
                return descriptor
                    .cached_instance()
                    .ok_or_else(|| ResolveError::DependencyNotFound {
                        service,
                        context_key: context_key.to_string(),
                    })
            }
            Recipe::AsyncConstructor { .. } | Recipe::AsyncFactory(_) => {
                return Err(self.async_initialization(service))
            }
        };

        self.inject(descriptor, built.as_mut(), context_key)?;
        let instance = (descriptor.finish)(built)?;

        match &descriptor.on_init {
            Some(Hook::Sync(on_init)) => on_init(&instance)
                .map_err(|error| ResolveError::from_hook(service, "on_init", error))?,
            Some(Hook::Async(_)) => return Err(self.async_initialization(service)),
            None => {}
        }

        self.store(descriptor, instance)
    }

    fn inject(
        &self,
        descriptor: &ServiceDescriptor,
        target: &mut (dyn Any + Send),
        context_key: &str,
    ) -> Result<(), ResolveError> {
        for property in &descriptor.properties {
            let argument = self.resolve_argument(&property.dependency, context_key)?;
            (property.apply)(target, argument)?;
        }

        for method in &descriptor.methods {
            let mut args =
                self.collect_arguments(descriptor.implementation, &method.parameters, context_key)?;
            (method.invoke)(target, &mut args)
                .map_err(|error| ResolveError::from_hook(descriptor.service, method.name, error))?;
        }

        Ok(())
    }

    /// Resolves parameters by name, unkeyed parameters use `inherited_key`
    fn collect_arguments(
        &self,
        implementation: TypeInfo,
        parameters: &[Parameter],
        inherited_key: &str,
    ) -> Result<Arguments, ResolveError> {
        let mut args = Arguments::new(implementation);

        for parameter in parameters {
            let argument = match &parameter.kind {
                ParameterKind::Untyped => {
                    return Err(ResolveError::Construction {
                        implementation,
                        parameter: parameter.name,
                    })
                }
                ParameterKind::Defaulted => Argument::Default,
                ParameterKind::Dependency { info, context_key } => {
                    let context_key = context_key.as_deref().unwrap_or(inherited_key);
                    self.resolve_argument(info, context_key)?
                }
            };
            args.insert(parameter.name, argument);
        }

        Ok(args)
    }

    fn resolve_argument(
        &self,
        info: &DependencyInfo,
        context_key: &str,
    ) -> Result<Argument, ResolveError> {
        if info.lazy {
            return Ok(self.lazy_argument(info, context_key));
        }

        Self::into_argument(info, self.resolve_instance(info.type_info, context_key))
    }
}

// Suspending path
impl DiHandle {
    pub(crate) fn resolve_instance_async(
        &self,
        service: TypeInfo,
        context_key: String,
    ) -> BoxFuture<'static, Result<Instance, ResolveError>> {
        let this = self.clone();
        async move {
            let (frame, descriptor) = match this.prepare(service, &context_key)? {
                Prepared::Ready(instance) => return Ok(instance),
                Prepared::Build { frame, descriptor } => (frame, descriptor),
            };

            let _building = match descriptor.lifecycle {
                Lifecycle::Singleton => {
                    let guard = descriptor.build_guard.lock().await;
                    if let Some(instance) = descriptor.cached_instance() {
                        return Ok(instance);
                    }
                    Some(guard)
                }
                _ => None,
            };

            tracing::debug!("Async resolving {}", service);

            let mut built = match &descriptor.recipe {
                Recipe::Factory(factory) => {
                    factory(&frame).map_err(|error| ResolveError::from_factory(service, error))?
                }
                Recipe::AsyncFactory(factory) => factory(frame.clone())
                    .await
                    .map_err(|error| ResolveError::from_factory(service, error))?,
                Recipe::Constructor { parameters, build } => {
                    let mut args = frame
                        .collect_arguments_async(descriptor.implementation, parameters, "")
                        .await?;
                    build(&mut args).map_err(|error| ResolveError::from_factory(service, error))?
                }
                Recipe::AsyncConstructor { parameters, build } => {
                    let args = frame
                        .collect_arguments_async(descriptor.implementation, parameters, "")
                        .await?;
                    build(args)
                        .await
                        .map_err(|error| ResolveError::from_factory(service, error))?
                }
                Recipe::Instance => {
                    return descriptor
                        .cached_instance()
                        .ok_or_else(|| ResolveError::DependencyNotFound {
                            service,
                            context_key: context_key.clone(),
                        })
                }
            };

            frame
                .inject_async(&descriptor, built.as_mut(), &context_key)
                .await?;
            let instance = (descriptor.finish)(built)?;

            if let Some(on_init) = &descriptor.on_init {
                on_init
                    .run(&instance)
                    .await
                    .map_err(|error| ResolveError::from_hook(service, "on_init", error))?;
            }

            frame.store(&descriptor, instance)
        }
        .boxed()
    }

    async fn inject_async(
        &self,
        descriptor: &ServiceDescriptor,
        target: &mut (dyn Any + Send),
        context_key: &str,
    ) -> Result<(), ResolveError> {
        for property in &descriptor.properties {
            let argument = self
                .resolve_argument_async(&property.dependency, context_key)
                .await?;
            (property.apply)(target, argument)?;
        }

        for method in &descriptor.methods {
            let mut args = self
                .collect_arguments_async(descriptor.implementation, &method.parameters, context_key)
                .await?;
            (method.invoke)(target, &mut args)
                .map_err(|error| ResolveError::from_hook(descriptor.service, method.name, error))?;
        }

        Ok(())
    }

    async fn collect_arguments_async(
        &self,
        implementation: TypeInfo,
        parameters: &[Parameter],
        inherited_key: &str,
    ) -> Result<Arguments, ResolveError> {
        let mut args = Arguments::new(implementation);

        for parameter in parameters {
            let argument = match &parameter.kind {
                ParameterKind::Untyped => {
                    return Err(ResolveError::Construction {
                        implementation,
                        parameter: parameter.name,
                    })
                }
                ParameterKind::Defaulted => Argument::Default,
                ParameterKind::Dependency { info, context_key } => {
                    let context_key = context_key.as_deref().unwrap_or(inherited_key);
                    self.resolve_argument_async(info, context_key).await?
                }
            };
            args.insert(parameter.name, argument);
        }

        Ok(args)
    }

    async fn resolve_argument_async(
        &self,
        info: &DependencyInfo,
        context_key: &str,
    ) -> Result<Argument, ResolveError> {
        if info.lazy {
            return Ok(self.lazy_argument(info, context_key));
        }

        let resolved = self
            .resolve_dependency_async(info.type_info, context_key)
            .await;
        Self::into_argument(info, resolved)
    }

    /// Only suspends for dependencies whose own descriptor is async
    ///
    /// Everything else goes through the non-suspending path, so an async service further down
    /// a sync dependency's graph fails with [ResolveError::AsyncInitialization].
    async fn resolve_dependency_async(
        &self,
        service: TypeInfo,
        context_key: &str,
    ) -> Result<Instance, ResolveError> {
        let suspends = self
            .container
            .find_descriptor(service, context_key)
            .is_ok_and(|descriptor| descriptor.is_async);

        match suspends {
            true => {
                self.resolve_instance_async(service, context_key.to_string())
                    .await
            }
            false => self.resolve_instance(service, context_key),
        }
    }
}
