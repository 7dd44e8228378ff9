use std::{
    any::{Any, TypeId},
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

use retrosys_di::{container::DiContainer, types::TypeInfo};

use crate::errors::{GetConfigError, RegisterConfigError};

type AnyConfig = Arc<dyn Any + Send + Sync>;

/// Typed configuration registry, one value per config type
///
/// Registered into a container once, after which any constructor can ask for a
/// [Config](crate::config::Config) of a type it holds.
#[derive(Default)]
pub struct ConfigProvider {
    values: HashMap<TypeId, AnyConfig>,
}

impl ConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The config of type `T`, `Ok(None)` if there is none
    pub fn get_config<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, GetConfigError> {
        let Some(value) = self.values.get(&TypeId::of::<T>()) else {
            return Ok(None);
        };

        Arc::clone(value)
            .downcast::<T>()
            .map(Some)
            .map_err(|_| GetConfigError::Mismatched(TypeInfo::of::<T>()))
    }

    /// Like [ConfigProvider::get_config], treating a missing config as an error
    pub fn require_config<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, GetConfigError> {
        self.get_config::<T>()?
            .ok_or(GetConfigError::Missing(TypeInfo::of::<T>()))
    }

    /// Stores `config`, each type can only be added once
    pub fn add_config<T: Send + Sync + 'static>(
        &mut self,
        config: T,
    ) -> Result<&mut Self, RegisterConfigError> {
        let info = TypeInfo::of::<T>();
        match self.values.entry(info.type_id) {
            Entry::Occupied(_) => Err(RegisterConfigError::AlreadyRegistered(info)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(config));
                tracing::debug!("Registered config {info}");
                Ok(self)
            }
        }
    }

    /// [ConfigProvider::add_config] for optional sections, `None` is a no-op
    pub fn maybe_add_config<T: Send + Sync + 'static>(
        &mut self,
        config: Option<T>,
    ) -> Result<&mut Self, RegisterConfigError> {
        if let Some(config) = config {
            self.add_config(config)?;
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Makes all configs of the provider injectable through [Config](crate::config::Config)
pub fn register_config_provider(container: &DiContainer, provider: ConfigProvider) {
    container.register_instance(Arc::new(provider));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct HttpConfig {
        port: u16,
    }

    #[test]
    fn add_and_get() {
        let mut provider = ConfigProvider::new();
        provider.add_config(HttpConfig { port: 8080 }).unwrap();

        assert_eq!(
            *provider.get_config::<HttpConfig>().unwrap().unwrap(),
            HttpConfig { port: 8080 }
        );
        assert!(provider.get_config::<String>().unwrap().is_none());
        assert!(matches!(
            provider.require_config::<String>(),
            Err(GetConfigError::Missing(_))
        ));
    }

    #[test]
    fn rejects_duplicates() {
        let mut provider = ConfigProvider::new();
        provider
            .add_config(HttpConfig { port: 1 })
            .unwrap()
            .maybe_add_config::<String>(None)
            .unwrap();

        let error = provider.add_config(HttpConfig { port: 2 }).err().unwrap();
        assert!(matches!(error, RegisterConfigError::AlreadyRegistered(_)));
        assert_eq!(provider.len(), 1);
    }
}
