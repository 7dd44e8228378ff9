//! Disposal capabilities for services that need structured teardown.
//!
//! Implementing one of these traits does nothing on its own, the registration opts in with
//! [Registration::disposable](crate::builder::Registration::disposable) or
//! [Registration::async_disposable](crate::builder::Registration::async_disposable). A
//! registered disposal operation takes precedence over the on-destroy hook.

use std::future::Future;

use crate::types::{DynError, Injectable};

/// Synchronous teardown, e.g. flushing a buffer
pub trait Dispose: Injectable {
    fn dispose(&self) -> Result<(), DynError>;
}

/// Teardown that may suspend, e.g. closing a connection gracefully
pub trait AsyncDispose: Injectable {
    fn dispose(&self) -> impl Future<Output = Result<(), DynError>> + Send;
}
