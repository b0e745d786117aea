//! Namespaces partition the keyspace and pin each partition to one backend.

use std::{borrow::Borrow, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::StoreError;

const MAX_NAMESPACE_LEN: usize = 64;

/// Identifier of a keyspace partition such as `cache` or `server.config`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub const CACHE: &'static str = "cache";
    pub const SERVER_CONFIG: &'static str = "server.config";
    pub const CLIENT_CONFIG: &'static str = "client.config";

    /// Validate and wrap a namespace identifier.
    ///
    /// Identifiers are short, non-empty and limited to ASCII alphanumerics,
    /// `.`, `-` and `_` so that they are safe inside object keys.
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(StoreError::InvalidNamespace {
                message: "namespace must not be empty".to_string(),
            });
        }
        if name.len() > MAX_NAMESPACE_LEN {
            return Err(StoreError::InvalidNamespace {
                message: format!("namespace `{name}` exceeds {MAX_NAMESPACE_LEN} characters"),
            });
        }
        if name.starts_with('.') {
            return Err(StoreError::InvalidNamespace {
                message: format!("namespace `{name}` must not start with `.`"),
            });
        }
        if let Some(ch) = name
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_')))
        {
            return Err(StoreError::InvalidNamespace {
                message: format!("namespace `{name}` contains unsupported character `{ch}`"),
            });
        }
        Ok(Self(name))
    }

    pub fn cache() -> Self {
        Self(Self::CACHE.to_string())
    }

    pub fn server_config() -> Self {
        Self(Self::SERVER_CONFIG.to_string())
    }

    pub fn client_config() -> Self {
        Self(Self::CLIENT_CONFIG.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Namespace {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl Borrow<str> for Namespace {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Persistence mechanism a namespace is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Rows in the shared `kv_entries` table.
    Relational,
    /// One serialized blob per namespace in the object store.
    Object,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relational" | "sql" | "postgres" => Ok(Self::Relational),
            "object" | "blob" => Ok(Self::Object),
            other => Err(format!("unknown backend `{other}`")),
        }
    }
}

/// Static description of how a namespace is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceBinding {
    pub namespace: Namespace,
    pub backend: BackendKind,
    /// Secret-bearing namespaces may only live in relational storage.
    pub secret: bool,
}

impl NamespaceBinding {
    pub fn new(namespace: Namespace, backend: BackendKind, secret: bool) -> Self {
        Self {
            namespace,
            backend,
            secret,
        }
    }

    /// Reject bindings that would place secrets into an object blob.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.secret && self.backend == BackendKind::Object {
            return Err(StoreError::SecretPlacement {
                namespace: self.namespace.to_string(),
            });
        }
        Ok(())
    }

    /// Bindings used when configuration does not name any namespaces.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(Namespace::cache(), BackendKind::Object, false),
            Self::new(Namespace::server_config(), BackendKind::Relational, true),
            Self::new(Namespace::client_config(), BackendKind::Object, false),
        ]
    }
}
