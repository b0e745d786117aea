use thiserror::Error;

use super::namespace::BackendKind;

/// Failures surfaced by the store facade and its backends.
///
/// A missing key is never an error; lookups return `None` instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{backend} backend unavailable: {message}")]
    Unavailable {
        backend: BackendKind,
        message: String,
    },
    #[error("value could not be serialized: {0}")]
    Serialization(String),
    #[error("namespace `{namespace}` holds secrets and must not be bound to object storage")]
    SecretPlacement { namespace: String },
    #[error("namespace `{namespace}` has no configured backend")]
    UnknownNamespace { namespace: String },
    #[error("invalid namespace: {message}")]
    InvalidNamespace { message: String },
    #[error("invalid key: {message}")]
    InvalidKey { message: String },
}

impl StoreError {
    pub fn unavailable(backend: BackendKind, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            backend,
            message: err.to_string(),
        }
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }

    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// True when the failure came from an unreachable or failing backend,
    /// which callers may choose to degrade around.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
