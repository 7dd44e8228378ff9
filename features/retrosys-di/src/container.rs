use std::{
    any::TypeId,
    collections::HashMap,
    fmt::Debug,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

use crate::{
    builder::Registration,
    declaration::{declaration_of, Declaration, Declared},
    dependency_graph::DependencyGraph,
    descriptor::{select, Lifecycle, ServiceDescriptor},
    errors::ResolveError,
    factories::Component,
    module::Module,
    resolution::DiHandle,
    resolver::lazy::Lazy,
    scope::Scope,
    types::{DynError, Injectable, Instance, TypeInfo},
};

/// Container holding all registrations and the singletons created from them
///
/// Cheap to clone, all clones share the same registry.
#[derive(Clone)]
pub struct DiContainer(pub(crate) Arc<DiContainerInner>);
pub(crate) struct DiContainerInner {
    registry: RwLock<Registry>,
    test_mode: AtomicBool,
    mocks: RwLock<HashMap<TypeId, Instance>>,
}

#[derive(Default, Clone)]
struct Registry {
    /// Registrations per service identity, in registration order
    descriptors: HashMap<TypeId, Vec<Arc<ServiceDescriptor>>>,
    /// Imported modules, by namespace
    modules: Vec<(String, Module)>,
    /// Types that may be registered on first request
    declarations: HashMap<TypeId, Declaration>,
}

impl Debug for DiContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.0.registry.read();
        let mut map = f.debug_struct("DiContainer");
        for descriptors in registry.descriptors.values() {
            for descriptor in descriptors {
                let val = if descriptor.cached.read().is_some() {
                    "cached"
                } else {
                    "registered"
                };
                map.field(descriptor.service.type_name, &val);
            }
        }
        for (namespace, _) in &registry.modules {
            map.field(namespace, &"module");
        }
        map.finish()
    }
}

impl Default for DiContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl DiContainer {
    pub fn new() -> Self {
        Self::with_registry(Registry::default(), false, HashMap::new())
    }

    fn with_registry(
        registry: Registry,
        test_mode: bool,
        mocks: HashMap<TypeId, Instance>,
    ) -> Self {
        DiContainer(Arc::new(DiContainerInner {
            registry: RwLock::new(registry),
            test_mode: AtomicBool::new(test_mode),
            mocks: RwLock::new(mocks),
        }))
    }

    /// Starts a fresh call chain against this container
    pub fn handle(&self) -> DiHandle {
        DiHandle::new(self.clone(), None)
    }
}

// Registration
impl DiContainer {
    /// Adds a registration
    ///
    /// Registering the same service again keeps the earlier registrations; lookups prefer the
    /// one whose context key matches, then the first one registered.
    pub fn register<I: Injectable>(&self, registration: Registration<I>) -> &Self {
        self.add(registration.build());
        self
    }

    /// Registers a pre-built singleton
    pub fn register_instance<T: ?Sized + Injectable>(&self, instance: Arc<T>) -> &Self {
        self.add(ServiceDescriptor::for_instance(Instance::new(instance)));
        self
    }

    pub fn register_factory<I, F>(&self, factory: F, lifecycle: Lifecycle) -> &Self
    where
        I: Injectable,
        F: Fn(&DiHandle) -> Result<I, DynError> + Send + Sync + 'static,
    {
        self.register(Registration::factory(factory).lifecycle(lifecycle))
    }

    pub fn register_async_factory<I, F, Fut>(&self, factory: F, lifecycle: Lifecycle) -> &Self
    where
        I: Injectable,
        F: Fn(DiHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<I, DynError>> + Send + 'static,
    {
        self.register(Registration::async_factory(factory).lifecycle(lifecycle))
    }

    pub fn register_component<I: Component>(&self, lifecycle: Lifecycle) -> &Self {
        self.register(Registration::<I>::component().lifecycle(lifecycle))
    }

    /// Registers a type using its own declaration
    pub fn register_declared<T: Declared>(&self) -> &Self {
        self.register(T::declare())
    }

    /// Lets the type register itself the first time it is requested without a registration
    pub fn allow_auto_register<T: Declared>(&self) -> &Self {
        let (service, declaration) = declaration_of::<T>();
        self.0
            .registry
            .write()
            .declarations
            .insert(service.type_id, declaration);
        self
    }

    /// Imports a module under a namespace, replacing any module already using it
    pub fn register_module(&self, module: &Module, namespace: impl Into<String>) -> &Self {
        let namespace = namespace.into();
        module.attach(self);

        let mut registry = self.0.registry.write();
        match registry.modules.iter_mut().find(|(name, _)| *name == namespace) {
            Some((_, existing)) => {
                tracing::warn!(
                    "Module namespace '{}' already in use - replacing '{}' with '{}'",
                    namespace,
                    existing.name(),
                    module.name()
                );
                *existing = module.clone();
            }
            None => registry.modules.push((namespace, module.clone())),
        }
        self
    }

    /// The module imported under `namespace`
    pub fn module(&self, namespace: &str) -> Option<Module> {
        self.0
            .registry
            .read()
            .modules
            .iter()
            .find(|(name, _)| name == namespace)
            .map(|(_, module)| module.clone())
    }

    fn add(&self, descriptor: ServiceDescriptor) {
        tracing::debug!(
            "Registered {} as {} ({:?})",
            descriptor.implementation,
            descriptor.service,
            descriptor.lifecycle
        );
        self.0
            .registry
            .write()
            .descriptors
            .entry(descriptor.service.type_id)
            .or_default()
            .push(Arc::new(descriptor));
    }
}

// Lookup
impl DiContainer {
    /// Finds the registration for a service: own registrations first, then imported modules
    pub fn get_descriptor(
        &self,
        service: TypeInfo,
        context_key: &str,
    ) -> Option<Arc<ServiceDescriptor>> {
        let modules = {
            let registry = self.0.registry.read();
            if let Some(found) = registry
                .descriptors
                .get(&service.type_id)
                .and_then(|descriptors| select(descriptors, context_key))
            {
                return Some(found.clone());
            }
            registry
                .modules
                .iter()
                .map(|(_, module)| module.clone())
                .collect::<Vec<_>>()
        };

        modules
            .iter()
            .find_map(|module| module.get_descriptor(service, context_key))
    }

    /// All own registrations of `T`, in registration order
    pub fn descriptors_of<T: ?Sized + Injectable>(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.0
            .registry
            .read()
            .descriptors
            .get(&TypeId::of::<T>())
            .cloned()
            .unwrap_or_default()
    }

    /// True if `T` can be found here or in an imported module
    pub fn is_registered<T: ?Sized + Injectable>(&self) -> bool {
        self.get_descriptor(TypeInfo::of::<T>(), "").is_some()
    }

    /// Like [DiContainer::get_descriptor], registering a declared type on first request
    pub(crate) fn find_descriptor(
        &self,
        service: TypeInfo,
        context_key: &str,
    ) -> Result<Arc<ServiceDescriptor>, ResolveError> {
        if let Some(descriptor) = self.get_descriptor(service, context_key) {
            return Ok(descriptor);
        }

        {
            let mut registry = self.0.registry.write();
            if !registry.descriptors.contains_key(&service.type_id) {
                if let Some(declare) = registry.declarations.get(&service.type_id).cloned() {
                    tracing::debug!("Auto-registering {}", service);
                    registry
                        .descriptors
                        .entry(service.type_id)
                        .or_default()
                        .push(Arc::new(declare()));
                }
            }
        }

        self.get_descriptor(service, context_key)
            .ok_or_else(|| ResolveError::DependencyNotFound {
                service,
                context_key: context_key.to_string(),
            })
    }

    pub(crate) fn all_descriptors(&self) -> Vec<Arc<ServiceDescriptor>> {
        let (mut descriptors, modules) = {
            let registry = self.0.registry.read();
            let descriptors = registry.descriptors.values().flatten().cloned().collect::<Vec<_>>();
            let modules = registry
                .modules
                .iter()
                .map(|(_, module)| module.clone())
                .collect::<Vec<_>>();
            (descriptors, modules)
        };

        for module in modules {
            descriptors.extend(module.container().all_descriptors());
        }
        descriptors
    }
}

// Resolution
impl DiContainer {
    /// Resolves the default registration of `T` without suspending
    ///
    /// ```ignore
    /// let service = container.resolve::<UserService>()?;
    /// let repository = container.resolve::<dyn UserRepository>()?;
    /// ```
    pub fn resolve<T: ?Sized + Injectable>(&self) -> Result<Arc<T>, ResolveError> {
        self.handle().resolve::<T>()
    }

    pub fn resolve_keyed<T: ?Sized + Injectable>(
        &self,
        context_key: &str,
    ) -> Result<Arc<T>, ResolveError> {
        self.handle().resolve_keyed::<T>(context_key)
    }

    pub async fn resolve_async<T: ?Sized + Injectable>(&self) -> Result<Arc<T>, ResolveError> {
        self.handle().resolve_async::<T>().await
    }

    pub async fn resolve_keyed_async<T: ?Sized + Injectable>(
        &self,
        context_key: &str,
    ) -> Result<Arc<T>, ResolveError> {
        self.handle().resolve_keyed_async::<T>(context_key).await
    }

    /// A handle that resolves `T` on first use
    pub fn lazy_resolve<T: ?Sized + Injectable>(&self, context_key: &str) -> Lazy<T> {
        self.handle().lazy::<T>(context_key)
    }

    pub(crate) fn resolve_instance(
        &self,
        service: TypeInfo,
        context_key: &str,
    ) -> Result<Instance, ResolveError> {
        self.handle().resolve_instance(service, context_key)
    }

    pub(crate) async fn resolve_instance_async(
        &self,
        service: TypeInfo,
        context_key: String,
    ) -> Result<Instance, ResolveError> {
        self.handle()
            .resolve_instance_async(service, context_key)
            .await
    }
}

// Derived containers
impl DiContainer {
    /// A container with a snapshot of this one's registrations
    ///
    /// Registrations are shared, so singletons already cached (or cached later) by either side
    /// are visible to both. New registrations on either side are not.
    pub fn create_child_container(&self) -> DiContainer {
        let registry = self.0.registry.read().clone();
        let mocks = if self.is_test_mode() {
            self.0.mocks.read().clone()
        } else {
            HashMap::new()
        };
        DiContainer::with_registry(registry, self.is_test_mode(), mocks)
    }

    /// A scope caching scoped services until it is disposed
    pub fn create_scope(&self) -> Scope {
        Scope::new(self)
    }
}

// Test mode
impl DiContainer {
    pub fn enable_test_mode(&self) {
        self.0.test_mode.store(true, Ordering::SeqCst);
    }

    /// Leaves test mode, forgetting all mocks
    pub fn disable_test_mode(&self) {
        self.0.test_mode.store(false, Ordering::SeqCst);
        self.0.mocks.write().clear();
    }

    pub fn is_test_mode(&self) -> bool {
        self.0.test_mode.load(Ordering::SeqCst)
    }

    /// Overrides every resolution of `T` while test mode is enabled
    pub fn mock<T: ?Sized + Injectable>(&self, mock: Arc<T>) -> &Self {
        if !self.is_test_mode() {
            tracing::warn!(
                "Mock for {} registered outside of test mode - it is ignored until test mode is enabled",
                TypeInfo::of::<T>()
            );
        }
        self.0
            .mocks
            .write()
            .insert(TypeId::of::<T>(), Instance::new(mock));
        self
    }

    pub(crate) fn mock_for(&self, service: TypeInfo) -> Option<Instance> {
        if !self.is_test_mode() {
            return None;
        }
        self.0.mocks.read().get(&service.type_id).cloned()
    }
}

// Teardown and analysis
impl DiContainer {
    /// Tears down every cached singleton that has a disposal operation or on-destroy hook
    ///
    /// Failures are logged and do not stop the remaining teardowns. A disposed singleton is
    /// forgotten, resolving it again builds a new one.
    pub async fn dispose(&self) {
        let descriptors = self
            .0
            .registry
            .read()
            .descriptors
            .values()
            .flatten()
            .cloned()
            .collect::<Vec<_>>();

        for descriptor in descriptors {
            if descriptor.lifecycle != Lifecycle::Singleton {
                continue;
            }
            let Some(hook) = descriptor.teardown_hook() else {
                continue;
            };
            let Some(instance) = descriptor.cached.write().take() else {
                continue;
            };

            tracing::debug!("Disposing {}", descriptor.service);
            if let Err(error) = hook.run(&instance).await {
                tracing::error!("Failed to dispose {}: {}", descriptor.service, error);
            }
        }
    }

    /// Builds the static dependency graph of everything registered here and in imported modules
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::new(self)
    }
}
