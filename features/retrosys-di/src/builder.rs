use std::{
    any::{type_name, Any},
    future::Future,
    marker::PhantomData,
    sync::Arc,
};

use futures::FutureExt;

use parking_lot::RwLock;

use crate::{
    descriptor::{
        Finisher, Lifecycle, MethodInjection, PropertyInjection, ResolutionStrategy,
        ServiceDescriptor,
    },
    dispose::{AsyncDispose, Dispose},
    errors::ResolveError,
    factories::{
        Arguments, AsyncComponent, Built, Component, Hook, Parameter, Recipe,
    },
    resolution::DiHandle,
    resolver::{Argument, Resolver},
    types::{DynError, Injectable, Instance, TypeInfo},
};

/// Typed builder for a [ServiceDescriptor]
///
/// `I` is the implementation being built. By default it is also the service identity, use
/// [Registration::as_service] to expose it as something else (usually a trait object).
///
/// ```ignore
/// container.register(
///     Registration::<SqlUserRepository>::component()
///         .scoped()
///         .property::<Arc<Logger>>("logger", |repo, logger| repo.logger = Some(logger))
///         .on_destroy(|repo| repo.flush())
///         .as_service::<dyn UserRepository>(|repo| repo),
/// );
/// ```
pub struct Registration<I: Injectable> {
    service: TypeInfo,
    lifecycle: Lifecycle,
    context_key: String,
    is_async: bool,
    resolution_strategy: ResolutionStrategy,
    recipe: Recipe,
    properties: Vec<PropertyInjection>,
    methods: Vec<MethodInjection>,
    on_init: Option<Hook>,
    on_destroy: Option<Hook>,
    disposer: Option<Hook>,
    finish: Finisher,
    _implementation: PhantomData<fn() -> I>,
}

// Recipes
impl<I: Injectable> Registration<I> {
    fn with_recipe(recipe: Recipe) -> Self {
        Registration {
            service: TypeInfo::of::<I>(),
            lifecycle: Lifecycle::default(),
            context_key: String::new(),
            is_async: false,
            resolution_strategy: ResolutionStrategy::default(),
            recipe,
            properties: Vec::new(),
            methods: Vec::new(),
            on_init: None,
            on_destroy: None,
            disposer: None,
            finish: Arc::new(|built: Built| {
                let built = downcast_built::<I>(built)?;
                Ok(Instance::new(Arc::new(built)))
            }),
            _implementation: PhantomData,
        }
    }

    /// Constructor injection using the type's own [Component] declaration
    pub fn component() -> Self
    where
        I: Component,
    {
        Self::with_recipe(Recipe::component::<I>())
    }

    /// Constructor injection with a constructor that may suspend
    pub fn async_component() -> Self
    where
        I: AsyncComponent,
    {
        Self::with_recipe(Recipe::async_component::<I>())
    }

    /// Constructor injection with explicitly listed parameters
    pub fn constructor<F>(parameters: Vec<Parameter>, construct: F) -> Self
    where
        F: Fn(&mut Arguments) -> Result<I, DynError> + Send + Sync + 'static,
    {
        Self::with_recipe(Recipe::Constructor {
            parameters,
            build: Arc::new(move |args: &mut Arguments| {
                construct(args).map(|built| Box::new(built) as Built)
            }),
        })
    }

    /// A factory invoked with a handle to the resolving container
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&DiHandle) -> Result<I, DynError> + Send + Sync + 'static,
    {
        Self::with_recipe(Recipe::Factory(Arc::new(move |di: &DiHandle| {
            factory(di).map(|built| Box::new(built) as Built)
        })))
    }

    /// A factory that may suspend, always marks the registration async
    pub fn async_factory<F, Fut>(factory: F) -> Self
    where
        F: Fn(DiHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<I, DynError>> + Send + 'static,
    {
        Self::with_recipe(Recipe::AsyncFactory(Arc::new(move |di: DiHandle| {
            let construction_fut = factory(di);
            async move { construction_fut.await.map(|built| Box::new(built) as Built) }.boxed()
        })))
    }
}

// Metadata
impl<I: Injectable> Registration<I> {
    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn singleton(self) -> Self {
        self.lifecycle(Lifecycle::Singleton)
    }

    pub fn transient(self) -> Self {
        self.lifecycle(Lifecycle::Transient)
    }

    pub fn scoped(self) -> Self {
        self.lifecycle(Lifecycle::Scoped)
    }

    /// Disambiguates this registration from others of the same service
    pub fn context_key(mut self, context_key: impl Into<String>) -> Self {
        self.context_key = context_key.into();
        self
    }

    /// Marks the registration async
    ///
    /// Suspending recipes and hooks are always async, whatever is passed here.
    pub fn asynchronous(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    pub fn resolution_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.resolution_strategy = strategy;
        self
    }

    /// Exposes the implementation under another service identity
    pub fn as_service<S: ?Sized + Injectable>(
        mut self,
        upcast: impl Fn(Arc<I>) -> Arc<S> + Send + Sync + 'static,
    ) -> Self {
        self.service = TypeInfo::of::<S>();
        self.finish = Arc::new(move |built: Built| {
            let concrete = Arc::new(downcast_built::<I>(built)?);
            let service = upcast(concrete.clone());
            Ok(Instance::upcast(concrete, service))
        });
        self
    }
}

// Injection
impl<I: Injectable> Registration<I> {
    /// Assigns a dependency onto the instance after construction
    pub fn property<D: Resolver + 'static>(
        mut self,
        name: &'static str,
        setter: impl Fn(&mut I, D) + Send + Sync + 'static,
    ) -> Self {
        self.properties.push(PropertyInjection {
            name,
            dependency: D::dependency_info(),
            apply: Arc::new(move |target: &mut (dyn Any + Send), argument: Argument| {
                let target = target
                    .downcast_mut::<I>()
                    .ok_or(ResolveError::DowncastFailed {
                        required_type: type_name::<I>(),
                        actual_type: "unknown implementation",
                    })?;
                setter(target, D::from_argument(argument)?);
                Ok(())
            }),
        });
        self
    }

    /// Invokes a method after property injection, with its parameters resolved by name
    pub fn method(
        mut self,
        name: &'static str,
        parameters: Vec<Parameter>,
        invoke: impl Fn(&mut I, &mut Arguments) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        self.methods.push(MethodInjection {
            name,
            parameters,
            invoke: Arc::new(move |target: &mut (dyn Any + Send), args: &mut Arguments| {
                let target = target
                    .downcast_mut::<I>()
                    .ok_or_else(|| -> DynError {
                        Box::new(ResolveError::DowncastFailed {
                            required_type: type_name::<I>(),
                            actual_type: "unknown implementation",
                        })
                    })?;
                invoke(target, args)
            }),
        });
        self
    }
}

// Hooks
impl<I: Injectable> Registration<I> {
    /// Runs after injection, before the instance is cached or returned
    pub fn on_init(
        mut self,
        hook: impl Fn(&I) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        self.on_init = Some(sync_hook(hook));
        self
    }

    /// Suspending init hook, marks the registration async
    pub fn on_init_async<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DynError>> + Send + 'static,
    {
        self.on_init = Some(async_hook(hook));
        self
    }

    /// Runs when the owning container or scope tears the instance down
    pub fn on_destroy(
        mut self,
        hook: impl Fn(&I) -> Result<(), DynError> + Send + Sync + 'static,
    ) -> Self {
        self.on_destroy = Some(sync_hook(hook));
        self
    }

    pub fn on_destroy_async<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Arc<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DynError>> + Send + 'static,
    {
        self.on_destroy = Some(async_hook(hook));
        self
    }

    /// Tear down through [Dispose] instead of the on-destroy hook
    pub fn disposable(mut self) -> Self
    where
        I: Dispose,
    {
        self.disposer = Some(sync_hook(|instance: &I| Dispose::dispose(instance)));
        self
    }

    /// Tear down through [AsyncDispose] instead of the on-destroy hook
    pub fn async_disposable(mut self) -> Self
    where
        I: AsyncDispose,
    {
        self.disposer = Some(async_hook(|instance: Arc<I>| async move {
            AsyncDispose::dispose(&*instance).await
        }));
        self
    }
}

impl<I: Injectable> Registration<I> {
    pub fn service(&self) -> TypeInfo {
        self.service
    }

    pub(crate) fn build(self) -> ServiceDescriptor {
        // Never trust a sync flag on something that suspends
        let is_async = self.is_async
            || self.recipe.is_async()
            || self.on_init.as_ref().is_some_and(Hook::is_async);

        ServiceDescriptor {
            service: self.service,
            implementation: TypeInfo::of::<I>(),
            lifecycle: self.lifecycle,
            context_key: self.context_key,
            is_async,
            resolution_strategy: self.resolution_strategy,
            recipe: self.recipe,
            properties: self.properties,
            methods: self.methods,
            on_init: self.on_init,
            on_destroy: self.on_destroy,
            disposer: self.disposer,
            finish: self.finish,
            cached: RwLock::new(None),
            build_guard: futures::lock::Mutex::new(()),
        }
    }
}

fn downcast_built<I: Injectable>(built: Built) -> Result<I, ResolveError> {
    built
        .downcast::<I>()
        .map(|built| *built)
        .map_err(|_| ResolveError::DowncastFailed {
            required_type: type_name::<I>(),
            actual_type: "unknown implementation",
        })
}

fn sync_hook<I: Injectable>(
    hook: impl Fn(&I) -> Result<(), DynError> + Send + Sync + 'static,
) -> Hook {
    Hook::Sync(Arc::new(move |instance: &Instance| {
        let concrete = concrete_of::<I>(instance)?;
        hook(&concrete)
    }))
}

fn async_hook<I, F, Fut>(hook: F) -> Hook
where
    I: Injectable,
    F: Fn(Arc<I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DynError>> + Send + 'static,
{
    let hook = Arc::new(hook);
    Hook::Async(Arc::new(move |instance: Instance| {
        let hook = hook.clone();
        async move {
            let concrete = concrete_of::<I>(&instance)?;
            hook(concrete).await
        }
        .boxed()
    }))
}

fn concrete_of<I: Injectable>(instance: &Instance) -> Result<Arc<I>, DynError> {
    instance.concrete::<I>().ok_or_else(|| -> DynError {
        Box::new(ResolveError::DowncastFailed {
            required_type: type_name::<I>(),
            actual_type: instance.implementation.type_name,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }
    struct Thing;
    impl Named for Thing {
        fn name(&self) -> &str {
            "thing"
        }
    }

    #[test]
    fn suspending_recipes_force_async() {
        let sync = Registration::<Thing>::factory(|_| Ok(Thing)).build();
        assert!(!sync.is_async());

        let factory = Registration::<Thing>::async_factory(|_| async { Ok(Thing) })
            .asynchronous(false)
            .build();
        assert!(factory.is_async());

        let hooked = Registration::<Thing>::factory(|_| Ok(Thing))
            .on_init_async(|_| async { Ok(()) })
            .build();
        assert!(hooked.is_async());
    }

    #[test]
    fn as_service_changes_the_identity_only() {
        let descriptor = Registration::<Thing>::factory(|_| Ok(Thing))
            .transient()
            .context_key("primary")
            .as_service::<dyn Named>(|thing| thing)
            .build();

        assert_eq!(descriptor.service(), TypeInfo::of::<dyn Named>());
        assert_eq!(descriptor.implementation(), TypeInfo::of::<Thing>());
        assert_eq!(descriptor.lifecycle(), Lifecycle::Transient);
        assert_eq!(descriptor.context_key(), "primary");

        let instance = (descriptor.finish)(Box::new(Thing)).unwrap();
        assert_eq!(instance.downcast::<dyn Named>().unwrap().name(), "thing");
    }
}
