use std::sync::Arc;

use crate::{
    builder::Registration,
    descriptor::ServiceDescriptor,
    types::{Injectable, TypeInfo},
};

/// A type that carries its own registration
///
/// ```ignore
/// impl Declared for Logger {
///     fn declare() -> Registration<Self> {
///         Registration::factory(|_| Ok(Logger::default())).singleton()
///     }
/// }
///
/// container.register_declared::<Logger>();
/// ```
pub trait Declared: Injectable + Sized {
    fn declare() -> Registration<Self>;
}

pub(crate) type Declaration = Arc<dyn Fn() -> ServiceDescriptor + Send + Sync>;

/// The service identity `T` declares itself as, and a way to build its descriptor on demand
pub(crate) fn declaration_of<T: Declared>() -> (TypeInfo, Declaration) {
    let service = T::declare().service();
    (service, Arc::new(|| T::declare().build()))
}
