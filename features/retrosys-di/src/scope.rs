use std::{
    fmt::Debug,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures::FutureExt;
use parking_lot::Mutex;

use crate::{
    container::DiContainer,
    descriptor::ServiceDescriptor,
    errors::ResolveError,
    factories::Hook,
    resolution::DiHandle,
    types::{Injectable, Instance},
};

/// Scoped instances, in creation order
pub(crate) struct ScopeCache {
    entries: Mutex<Vec<ScopedEntry>>,
    closed: AtomicBool,
}

struct ScopedEntry {
    descriptor: Arc<ServiceDescriptor>,
    instance: Instance,
}

impl ScopeCache {
    fn new() -> Self {
        ScopeCache {
            entries: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn get(&self, descriptor: &Arc<ServiceDescriptor>) -> Option<Instance> {
        self.entries
            .lock()
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.descriptor, descriptor))
            .map(|entry| entry.instance.clone())
    }

    /// Caches the instance, keeping one cached first by a concurrent resolution
    pub(crate) fn insert_or_get(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
        instance: Instance,
    ) -> Result<Instance, ResolveError> {
        let mut entries = self.entries.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(ResolveError::ScopeClosed);
        }

        if let Some(existing) = entries
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.descriptor, descriptor))
        {
            return Ok(existing.instance.clone());
        }

        entries.push(ScopedEntry {
            descriptor: descriptor.clone(),
            instance: instance.clone(),
        });
        Ok(instance)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the cache, handing out its entries exactly once
    fn close(&self) -> Option<Vec<ScopedEntry>> {
        let mut entries = self.entries.lock();
        if self.closed.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(std::mem::take(&mut *entries))
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// A unit of work with its own scoped instances, e.g. one request
///
/// Scoped services resolved through a scope are created once per scope and torn down, in reverse
/// creation order, when the scope is disposed. Singletons and transients behave exactly as they
/// do on the container the scope was created from.
///
/// ```ignore
/// container
///     .create_scope()
///     .run(|scope| async move {
///         let repository = scope.resolve::<dyn UserRepository>()?;
///         repository.save(user).await
///     })
///     .await?;
/// ```
///
/// Dropping a scope that was never disposed still runs the synchronous teardowns. Asynchronous
/// ones need [Scope::dispose] (or [Scope::close]) and are skipped with a warning otherwise.
#[derive(Clone)]
pub struct Scope(Arc<ScopeInner>);
struct ScopeInner {
    container: DiContainer,
    cache: Arc<ScopeCache>,
}
impl Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("instances", &self.0.cache.len())
            .field("closed", &self.0.cache.is_closed())
            .finish()
    }
}

impl Scope {
    pub(crate) fn new(parent: &DiContainer) -> Self {
        Scope(Arc::new(ScopeInner {
            container: parent.create_child_container(),
            cache: Arc::new(ScopeCache::new()),
        }))
    }

    /// The child container backing this scope
    pub fn container(&self) -> &DiContainer {
        &self.0.container
    }

    pub fn handle(&self) -> DiHandle {
        DiHandle::new(self.0.container.clone(), Some(self.0.cache.clone()))
    }

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

    /// Number of scoped instances currently owned by the scope
    pub fn len(&self) -> usize {
        self.0.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_disposed(&self) -> bool {
        self.0.cache.is_closed()
    }

    /// Tears down all scoped instances, most recently created first
    ///
    /// Teardown failures are logged and do not stop the remaining teardowns. Only the first call
    /// does anything, and the scope refuses to resolve afterwards.
    pub async fn dispose(&self) {
        let Some(entries) = self.0.cache.close() else {
            return;
        };

        for entry in entries.into_iter().rev() {
            let Some(hook) = entry.descriptor.teardown_hook() else {
                continue;
            };
            if let Err(error) = hook.run(&entry.instance).await {
                tracing::error!(
                    "Failed to dispose scoped {}: {}",
                    entry.descriptor.service,
                    error
                );
            }
        }
    }

    /// Like [Scope::dispose], blocking the current thread on asynchronous teardowns
    pub fn close(&self) {
        let Some(entries) = self.0.cache.close() else {
            return;
        };

        for entry in entries.into_iter().rev() {
            let Some(hook) = entry.descriptor.teardown_hook() else {
                continue;
            };
            if let Err(error) = hook.run_blocking(&entry.instance) {
                tracing::error!(
                    "Failed to dispose scoped {}: {}",
                    entry.descriptor.service,
                    error
                );
            }
        }
    }

    /// Runs `body` with this scope and disposes it afterwards
    ///
    /// Disposal also runs, async disposers included, when `body` panics. The panic is resumed
    /// once the scope is disposed.
    pub async fn run<F, Fut, R>(self, body: F) -> R
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = R>,
    {
        let output = AssertUnwindSafe(body(self.clone())).catch_unwind().await;
        self.dispose().await;
        match output {
            Ok(output) => output,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let Some(entries) = self.cache.close() else {
            return;
        };

        for entry in entries.into_iter().rev() {
            match entry.descriptor.teardown_hook() {
                Some(Hook::Sync(hook)) => {
                    if let Err(error) = hook(&entry.instance) {
                        tracing::error!(
                            "Failed to dispose scoped {}: {}",
                            entry.descriptor.service,
                            error
                        );
                    }
                }
                Some(Hook::Async(_)) => tracing::warn!(
                    "Scope dropped without being disposed - skipping async teardown of {}",
                    entry.descriptor.service
                ),
                None => {}
            }
        }
    }
}
