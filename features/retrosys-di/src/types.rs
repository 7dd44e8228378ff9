use std::{
    any::{Any, TypeId},
    sync::Arc,
};

/// All errors must be Send + Sync so they can cross await points
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// We assume that we are using a multithreaded async runtime
/// So anything injectable needs to be Send + Sync + 'static
///
/// Unsized types are allowed, so `dyn Trait` can be used as a service identity.
pub trait Injectable: Send + Sync + 'static {}
impl<T: ?Sized + Send + Sync + 'static> Injectable for T {}

/// A resolved service.
///
/// Holds the service as an `Arc<S>` where `S` is the requested identity (possibly `dyn Trait`),
/// and a second handle on the same allocation typed as the concrete implementation, which is
/// what lifecycle hooks and disposers operate on.
#[derive(Clone)]
pub struct Instance {
    pub info: TypeInfo,
    pub implementation: TypeInfo,
    service: Arc<dyn Any + Send + Sync>,
    concrete: Arc<dyn Any + Send + Sync>,
}

impl Instance {
    pub(crate) fn new<T: ?Sized + Injectable>(instance: Arc<T>) -> Self {
        let erased: Arc<dyn Any + Send + Sync> = Arc::new(instance);
        Instance {
            info: TypeInfo::of::<T>(),
            implementation: TypeInfo::of::<T>(),
            service: erased.clone(),
            concrete: erased,
        }
    }

    /// Wraps an implementation that is exposed under another identity
    pub(crate) fn upcast<I: Injectable, S: ?Sized + Injectable>(
        concrete: Arc<I>,
        service: Arc<S>,
    ) -> Self {
        Instance {
            info: TypeInfo::of::<S>(),
            implementation: TypeInfo::of::<I>(),
            service: Arc::new(service),
            concrete: Arc::new(concrete),
        }
    }

    pub fn downcast<T: ?Sized + Injectable>(&self) -> Result<Arc<T>, &'static str> {
        match self.service.downcast_ref::<Arc<T>>() {
            Some(downcasted) => Ok(downcasted.clone()),
            None => Err(self.info.type_name),
        }
    }

    /// Access the instance as its implementation type
    pub(crate) fn concrete<I: Injectable>(&self) -> Option<Arc<I>> {
        self.concrete.downcast_ref::<Arc<I>>().cloned()
    }

    /// True if both handles point at the same resolved service
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.service, &other.service)
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("service", &self.info.type_name)
            .field("implementation", &self.implementation.type_name)
            .finish()
    }
}

/// Information about a dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyInfo {
    /// The required Type
    pub type_info: TypeInfo,
    /// If it is optional or required
    pub optional: bool,
    /// If the Dependency is injected lazily
    pub lazy: bool,
}
impl DependencyInfo {
    pub fn of<T: ?Sized + 'static>() -> DependencyInfo {
        DependencyInfo {
            type_info: TypeInfo::of::<T>(),
            optional: false,
            lazy: false,
        }
    }
}

/// Type Name and Type Id
///
/// Used as the service identity throughout the container.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}
