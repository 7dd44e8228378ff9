use std::{any::Any, fmt::Debug, sync::Arc};

use futures::lock::{Mutex, MutexGuard};
use parking_lot::RwLock;

use crate::{
    errors::ResolveError,
    factories::{Arguments, Built, Hook, Parameter, Recipe},
    resolver::Argument,
    types::{DependencyInfo, DynError, Instance, TypeInfo},
};

/// Defines how instances are cached and when they are disposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifecycle {
    /// One instance per owning container, created on first resolution
    #[default]
    Singleton,
    /// A new instance on every resolution, owned by the caller
    Transient,
    /// One instance per [Scope](crate::scope::Scope), disposed when the scope closes
    Scoped,
}

/// Advisory metadata about when construction should happen
///
/// Resolution itself behaves the same for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResolutionStrategy {
    #[default]
    Eager,
    Lazy,
}

pub(crate) type PropertySetter =
    Arc<dyn Fn(&mut (dyn Any + Send), Argument) -> Result<(), ResolveError> + Send + Sync>;
pub(crate) type MethodInvoker =
    Arc<dyn Fn(&mut (dyn Any + Send), &mut Arguments) -> Result<(), DynError> + Send + Sync>;
pub(crate) type Finisher = Arc<dyn Fn(Built) -> Result<Instance, ResolveError> + Send + Sync>;

/// A dependency assigned onto the instance after construction
pub(crate) struct PropertyInjection {
    pub(crate) name: &'static str,
    pub(crate) dependency: DependencyInfo,
    pub(crate) apply: PropertySetter,
}

/// A method invoked after property injection, with its parameters resolved by name
pub(crate) struct MethodInjection {
    pub(crate) name: &'static str,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) invoke: MethodInvoker,
}

/// The registered recipe for one service identity / context key pair
///
/// Everything but the cached instance is immutable once registered. Descriptors are shared
/// between a container and its children, so a singleton cached here is shared with them too.
pub struct ServiceDescriptor {
    pub(crate) service: TypeInfo,
    pub(crate) implementation: TypeInfo,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) context_key: String,
    pub(crate) is_async: bool,
    pub(crate) resolution_strategy: ResolutionStrategy,
    pub(crate) recipe: Recipe,
    pub(crate) properties: Vec<PropertyInjection>,
    pub(crate) methods: Vec<MethodInjection>,
    pub(crate) on_init: Option<Hook>,
    pub(crate) on_destroy: Option<Hook>,
    pub(crate) disposer: Option<Hook>,
    pub(crate) finish: Finisher,
    pub(crate) cached: RwLock<Option<Instance>>,
    /// Held while a singleton is built, so concurrent first resolutions build it once
    pub(crate) build_guard: Mutex<()>,
}

impl Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("service", &self.service.type_name)
            .field("implementation", &self.implementation.type_name)
            .field("lifecycle", &self.lifecycle)
            .field("context_key", &self.context_key)
            .field("is_async", &self.is_async)
            .field("resolution_strategy", &self.resolution_strategy)
            .field("cached", &self.cached.read().is_some())
            .finish()
    }
}

impl ServiceDescriptor {
    /// Descriptor for a pre-built instance - always a populated singleton
    pub(crate) fn for_instance(instance: Instance) -> Self {
        ServiceDescriptor {
            service: instance.info,
            implementation: instance.implementation,
            lifecycle: Lifecycle::Singleton,
            context_key: String::new(),
            is_async: false,
            resolution_strategy: ResolutionStrategy::Eager,
            recipe: Recipe::Instance,
            properties: Vec::new(),
            methods: Vec::new(),
            on_init: None,
            on_destroy: None,
            disposer: None,
            finish: Arc::new(|_: Built| -> Result<Instance, ResolveError> {
                Err(ResolveError::other(
                    "pre-built instances are never constructed",
                ))
            }),
            cached: RwLock::new(Some(instance)),
            build_guard: Mutex::new(()),
        }
    }

    pub fn service(&self) -> TypeInfo {
        self.service
    }

    pub fn implementation(&self) -> TypeInfo {
        self.implementation
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn resolution_strategy(&self) -> ResolutionStrategy {
        self.resolution_strategy
    }

    /// Declared constructor parameters, empty for factories and instances
    pub fn parameters(&self) -> &[Parameter] {
        self.recipe.parameters()
    }

    pub fn property_names(&self) -> Vec<&'static str> {
        self.properties.iter().map(|property| property.name).collect()
    }

    pub fn method_names(&self) -> Vec<&'static str> {
        self.methods.iter().map(|method| method.name).collect()
    }

    /// All dependencies this descriptor declares, across constructor, properties and methods
    pub fn dependencies(&self) -> Vec<DependencyInfo> {
        let constructor = self.parameters().iter().filter_map(Parameter::dependency);
        let properties = self.properties.iter().map(|property| &property.dependency);
        let methods = self
            .methods
            .iter()
            .flat_map(|method| method.parameters.iter().filter_map(Parameter::dependency));

        constructor.chain(properties).chain(methods).copied().collect()
    }

    pub fn cached_instance(&self) -> Option<Instance> {
        self.cached.read().clone()
    }

    /// Stores a singleton, keeping an instance that was stored first
    pub(crate) fn store_singleton(&self, instance: Instance) -> Instance {
        let mut slot = self.cached.write();
        match slot.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                *slot = Some(instance.clone());
                instance
            }
        }
    }

    /// Blocks the thread until no one else is building this descriptor
    ///
    /// Only taken on the non-suspending path, which never builds async descriptors.
    pub(crate) fn lock_build(&self) -> MutexGuard<'_, ()> {
        match self.build_guard.try_lock() {
            Some(guard) => guard,
            None => futures::executor::block_on(self.build_guard.lock()),
        }
    }

    /// The hook that tears down an instance: its own disposal operation, else on-destroy
    pub(crate) fn teardown_hook(&self) -> Option<&Hook> {
        self.disposer.as_ref().or(self.on_destroy.as_ref())
    }
}

/// Picks the registration matching `context_key`, falling back to the first registered one
pub(crate) fn select<'a>(
    descriptors: &'a [Arc<ServiceDescriptor>],
    context_key: &str,
) -> Option<&'a Arc<ServiceDescriptor>> {
    descriptors
        .iter()
        .find(|descriptor| descriptor.context_key == context_key)
        .or_else(|| descriptors.first())
}
