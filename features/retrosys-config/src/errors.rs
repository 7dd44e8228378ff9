use retrosys_di::{errors::ResolveError, types::TypeInfo};

/// Failures reading a config back out of a [ConfigProvider](crate::ConfigProvider)
#[derive(thiserror::Error, Debug, Clone)]
pub enum GetConfigError {
    #[error("The required Config type '{0}' is not known")]
    Missing(TypeInfo),
    /// A value is stored for the type, but it is not of that type
    #[error("The stored Config for '{0}' has the wrong type")]
    Mismatched(TypeInfo),
}

/// Failures adding a config to a [ConfigProvider](crate::ConfigProvider)
#[derive(thiserror::Error, Debug, Clone)]
pub enum RegisterConfigError {
    #[error("The Config type '{0}' is already registered")]
    AlreadyRegistered(TypeInfo),
}

impl From<GetConfigError> for ResolveError {
    fn from(error: GetConfigError) -> Self {
        ResolveError::other(error)
    }
}
