//! Per-request store container.

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::{Namespace, StoreError};

use super::facade::Store;
use super::lock::mutex_lock;
use super::registry::StoreFactory;

const SOURCE: &str = "store::container";

type Slot = Arc<OnceCell<Arc<Store>>>;

/// Builds each namespace's [`Store`] at most once for the lifetime of one request.
///
/// Concurrent first touches of a namespace share one in-flight construction.
/// A failed construction is not memoized; the next caller tries again. The
/// container holds no state beyond the request and is dropped with it, along
/// with any writes its stores still have staged.
pub struct RequestStores {
    factory: Arc<dyn StoreFactory>,
    slots: Mutex<HashMap<Namespace, Slot>>,
}

impl std::fmt::Debug for RequestStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStores")
            .field("opened", &self.opened())
            .finish_non_exhaustive()
    }
}

impl RequestStores {
    pub fn new(factory: Arc<dyn StoreFactory>) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The store for `namespace`, constructing it on first use.
    pub async fn store(&self, namespace: &Namespace) -> Result<Arc<Store>, StoreError> {
        let slot = mutex_lock(&self.slots, SOURCE, "store")
            .entry(namespace.clone())
            .or_default()
            .clone();

        let store = slot
            .get_or_try_init(|| async {
                debug!(
                    target = "soffio_kv::container",
                    namespace = %namespace,
                    "constructing store"
                );
                self.factory.open(namespace).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(store))
    }

    pub async fn cache(&self) -> Result<Arc<Store>, StoreError> {
        self.store(&Namespace::cache()).await
    }

    pub async fn server_config(&self) -> Result<Arc<Store>, StoreError> {
        self.store(&Namespace::server_config()).await
    }

    pub async fn client_config(&self) -> Result<Arc<Store>, StoreError> {
        self.store(&Namespace::client_config()).await
    }

    /// Namespaces whose store has finished construction, sorted.
    pub fn opened(&self) -> Vec<Namespace> {
        let mut opened: Vec<Namespace> = mutex_lock(&self.slots, SOURCE, "opened")
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(namespace, _)| namespace.clone())
            .collect();
        opened.sort();
        opened
    }
}
