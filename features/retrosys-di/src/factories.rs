use std::{any::Any, collections::HashMap, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    errors::ResolveError,
    resolution::DiHandle,
    resolver::{Argument, Resolver},
    types::{DependencyInfo, DynError, Injectable, Instance, TypeInfo},
};

/// A type which knows how to construct itself from its declared parameters
///
/// This is constructor injection without runtime introspection: the type lists its parameters
/// once, the container resolves them, and hands them back as [Arguments].
///
/// ```ignore
/// impl Component for UserService {
///     fn parameters() -> Vec<Parameter> {
///         vec![Parameter::of::<Arc<Database>>("db"), Parameter::defaulted("retries")]
///     }
///
///     fn construct(args: &mut Arguments) -> Result<Self, DynError> {
///         Ok(UserService {
///             db: args.take("db")?,
///             retries: 3,
///         })
///     }
/// }
/// ```
pub trait Component: Injectable + Sized {
    /// Returns the constructor parameters in the order they are resolved
    fn parameters() -> Vec<Parameter>;

    /// Constructs a new instance from the resolved arguments
    fn construct(args: &mut Arguments) -> Result<Self, DynError>;
}

/// A [Component] whose construction may suspend
pub trait AsyncComponent: Injectable + Sized {
    /// Returns the constructor parameters in the order they are resolved
    fn parameters() -> Vec<Parameter>;

    /// Constructs a new instance from the resolved arguments
    fn construct(args: Arguments) -> impl Future<Output = Result<Self, DynError>> + Send;
}

/// A declared constructor (or injected method) parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: &'static str,
    pub kind: ParameterKind,
}

#[derive(Debug, Clone)]
pub enum ParameterKind {
    /// Resolved from the container, with an optional context key of its own
    Dependency {
        info: DependencyInfo,
        context_key: Option<String>,
    },
    /// Not injected, the constructor falls back to its own default
    Defaulted,
    /// Neither a type nor a default - can never be satisfied
    Untyped,
}

impl Parameter {
    /// A parameter resolved through `D`, e.g. `Arc<T>`, `Option<Arc<T>>` or `Lazy<T>`
    pub fn of<D: Resolver>(name: &'static str) -> Self {
        Parameter {
            name,
            kind: ParameterKind::Dependency {
                info: D::dependency_info(),
                context_key: None,
            },
        }
    }

    /// Like [Parameter::of], but resolving the registration with the given context key
    pub fn keyed<D: Resolver>(name: &'static str, context_key: impl Into<String>) -> Self {
        Parameter {
            name,
            kind: ParameterKind::Dependency {
                info: D::dependency_info(),
                context_key: Some(context_key.into()),
            },
        }
    }

    pub fn defaulted(name: &'static str) -> Self {
        Parameter {
            name,
            kind: ParameterKind::Defaulted,
        }
    }

    pub fn untyped(name: &'static str) -> Self {
        Parameter {
            name,
            kind: ParameterKind::Untyped,
        }
    }

    /// The dependency this parameter points at, if it is injected at all
    pub fn dependency(&self) -> Option<&DependencyInfo> {
        match &self.kind {
            ParameterKind::Dependency { info, .. } => Some(info),
            _ => None,
        }
    }
}

/// Named arguments resolved for a constructor or injected method
#[derive(Debug)]
pub struct Arguments {
    implementation: TypeInfo,
    values: HashMap<&'static str, Argument>,
}

impl Arguments {
    pub(crate) fn new(implementation: TypeInfo) -> Self {
        Arguments {
            implementation,
            values: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: &'static str, argument: Argument) {
        self.values.insert(name, argument);
    }

    /// Takes the named argument out, converting it with `D`
    pub fn take<D: Resolver>(&mut self, name: &str) -> Result<D, ResolveError> {
        let argument = self
            .values
            .remove(name)
            .ok_or_else(|| ResolveError::MissingArgument {
                implementation: self.implementation,
                parameter: name.to_string(),
            })?;

        D::from_argument(argument)
    }

    /// True if the parameter was declared [Parameter::defaulted]
    pub fn is_default(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(Argument::Default))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The implementation under construction, before it is shared
pub(crate) type Built = Box<dyn Any + Send>;

pub(crate) type BuildFn = Arc<dyn Fn(&mut Arguments) -> Result<Built, DynError> + Send + Sync>;
pub(crate) type AsyncBuildFn =
    Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<Built, DynError>> + Send + Sync>;
pub(crate) type FactoryFn = Arc<dyn Fn(&DiHandle) -> Result<Built, DynError> + Send + Sync>;
pub(crate) type AsyncFactoryFn =
    Arc<dyn Fn(DiHandle) -> BoxFuture<'static, Result<Built, DynError>> + Send + Sync>;

/// How a descriptor produces its implementation
pub(crate) enum Recipe {
    Constructor {
        parameters: Vec<Parameter>,
        build: BuildFn,
    },
    AsyncConstructor {
        parameters: Vec<Parameter>,
        build: AsyncBuildFn,
    },
    Factory(FactoryFn),
    AsyncFactory(AsyncFactoryFn),
    /// Pre-built, lives in the descriptor's cache slot
    Instance,
}

impl Recipe {
    pub(crate) fn is_async(&self) -> bool {
        matches!(self, Recipe::AsyncConstructor { .. } | Recipe::AsyncFactory(_))
    }

    pub(crate) fn parameters(&self) -> &[Parameter] {
        match self {
            Recipe::Constructor { parameters, .. } | Recipe::AsyncConstructor { parameters, .. } => {
                parameters
            }
            _ => &[],
        }
    }

    pub(crate) fn component<T: Component>() -> Self {
        Recipe::Constructor {
            parameters: T::parameters(),
            build: Arc::new(|args: &mut Arguments| {
                T::construct(args).map(|built| Box::new(built) as Built)
            }),
        }
    }

    pub(crate) fn async_component<T: AsyncComponent>() -> Self {
        Recipe::AsyncConstructor {
            parameters: T::parameters(),
            build: Arc::new(|args: Arguments| {
                async move { T::construct(args).await.map(|built| Box::new(built) as Built) }
                    .boxed()
            }),
        }
    }
}

pub(crate) type SyncHookFn = Arc<dyn Fn(&Instance) -> Result<(), DynError> + Send + Sync>;
pub(crate) type AsyncHookFn =
    Arc<dyn Fn(Instance) -> BoxFuture<'static, Result<(), DynError>> + Send + Sync>;

/// A lifecycle callback (init, destroy, dispose)
#[derive(Clone)]
pub(crate) enum Hook {
    Sync(SyncHookFn),
    Async(AsyncHookFn),
}

impl Hook {
    pub(crate) fn is_async(&self) -> bool {
        matches!(self, Hook::Async(_))
    }

    pub(crate) async fn run(&self, instance: &Instance) -> Result<(), DynError> {
        match self {
            Hook::Sync(hook) => hook(instance),
            Hook::Async(hook) => hook(instance.clone()).await,
        }
    }

    /// Runs the hook to completion on the current thread
    pub(crate) fn run_blocking(&self, instance: &Instance) -> Result<(), DynError> {
        match self {
            Hook::Sync(hook) => hook(instance),
            Hook::Async(hook) => futures::executor::block_on(hook(instance.clone())),
        }
    }
}
