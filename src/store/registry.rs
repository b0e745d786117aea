//! Namespace-to-backend bindings and store construction.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::domain::{BackendKind, Namespace, NamespaceBinding, StoreError};
use crate::infra::db::PostgresKv;
use crate::infra::objects::{ObjectBackend, ObjectStore};

use super::backend::Backend;
use super::facade::Store;

/// Opens stores for namespaces.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn open(&self, namespace: &Namespace) -> Result<Store, StoreError>;
}

/// Production factory: binds each configured namespace to the relational or
/// object backend, fixed for the life of the process.
pub struct BackendRegistry {
    bindings: HashMap<Namespace, NamespaceBinding>,
    relational: Option<PostgresKv>,
    objects: Arc<dyn ObjectStore>,
    object_prefix: String,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("bindings", &self.bindings)
            .field("relational", &self.relational.is_some())
            .field("objects", &self.objects.name())
            .field("object_prefix", &self.object_prefix)
            .finish()
    }
}

impl BackendRegistry {
    /// Validate bindings and build the registry.
    ///
    /// Fails when a secret-bearing namespace is bound to object storage, when
    /// a namespace is bound twice, or when a relational binding exists without
    /// a database.
    pub fn new(
        bindings: impl IntoIterator<Item = NamespaceBinding>,
        relational: Option<PostgresKv>,
        objects: Arc<dyn ObjectStore>,
        object_prefix: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let mut map = HashMap::new();
        for binding in bindings {
            binding.validate()?;
            if binding.backend == BackendKind::Relational && relational.is_none() {
                return Err(StoreError::unavailable(
                    BackendKind::Relational,
                    format!(
                        "namespace `{}` is relational but no database is configured",
                        binding.namespace
                    ),
                ));
            }
            if map.contains_key(&binding.namespace) {
                return Err(StoreError::InvalidNamespace {
                    message: format!("namespace `{}` is bound more than once", binding.namespace),
                });
            }
            map.insert(binding.namespace.clone(), binding);
        }

        Ok(Self {
            bindings: map,
            relational,
            objects,
            object_prefix: object_prefix.into(),
        })
    }

    pub fn binding(&self, namespace: &Namespace) -> Option<&NamespaceBinding> {
        self.bindings.get(namespace)
    }

    /// Bindings sorted by namespace.
    pub fn bindings(&self) -> Vec<&NamespaceBinding> {
        let mut bindings: Vec<_> = self.bindings.values().collect();
        bindings.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        bindings
    }
}

#[async_trait]
impl StoreFactory for BackendRegistry {
    async fn open(&self, namespace: &Namespace) -> Result<Store, StoreError> {
        let binding = self
            .bindings
            .get(namespace)
            .ok_or_else(|| StoreError::UnknownNamespace {
                namespace: namespace.to_string(),
            })?;
        binding.validate()?;

        let backend: Box<dyn Backend> = match binding.backend {
            BackendKind::Relational => {
                let kv = self.relational.as_ref().ok_or_else(|| {
                    StoreError::unavailable(BackendKind::Relational, "database is not configured")
                })?;
                Box::new(kv.backend(namespace.clone()))
            }
            BackendKind::Object => Box::new(ObjectBackend::new(
                namespace.clone(),
                Arc::clone(&self.objects),
                &self.object_prefix,
            )),
        };

        Ok(Store::new(backend))
    }
}
