use std::{any::type_name, sync::Arc};

use crate::{
    errors::ResolveError,
    resolver::{Argument, Resolver},
    types::{DependencyInfo, Injectable, Instance},
};

impl<T: ?Sized + Injectable> Resolver for Arc<T> {
    fn dependency_info() -> DependencyInfo {
        DependencyInfo::of::<T>()
    }

    fn from_argument(argument: Argument) -> Result<Self, ResolveError> {
        match argument {
            Argument::Resolved(instance) => downcast_instance(&instance),
            other => Err(unexpected_argument::<T>(&other)),
        }
    }
}

impl<T: ?Sized + Injectable> Resolver for Option<Arc<T>> {
    fn dependency_info() -> DependencyInfo {
        DependencyInfo {
            optional: true,
            ..DependencyInfo::of::<T>()
        }
    }

    fn from_argument(argument: Argument) -> Result<Self, ResolveError> {
        match argument {
            Argument::Resolved(instance) => downcast_instance(&instance).map(Some),
            // If the required type is not registered Option does not fail
            Argument::Missing => Ok(None),
            other => Err(unexpected_argument::<T>(&other)),
        }
    }
}

pub(crate) fn downcast_instance<T: ?Sized + Injectable>(
    instance: &Instance,
) -> Result<Arc<T>, ResolveError> {
    instance
        .downcast::<T>()
        .map_err(|actual_type| ResolveError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        })
}

fn unexpected_argument<T: ?Sized>(argument: &Argument) -> ResolveError {
    let actual_type = match argument {
        Argument::Resolved(instance) => instance.info.type_name,
        Argument::Lazy(_) => "lazy handle",
        Argument::Missing => "missing dependency",
        Argument::Default => "default value",
    };
    ResolveError::DowncastFailed {
        required_type: type_name::<T>(),
        actual_type,
    }
}
