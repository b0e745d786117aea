//! Administrative operations over the store: clearing the cache and reading
//! or writing the two configuration namespaces.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::info;

use crate::config::AdminSettings;
use crate::domain::{Namespace, StoreError, Value};
use crate::store::{RequestStores, Store};

/// Placeholder returned in place of a sensitive value.
pub const MASK: &str = "********";

/// Both configuration namespaces, sensitive values masked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationView {
    pub server: BTreeMap<String, Value>,
    pub client: BTreeMap<String, Value>,
}

/// Requested configuration changes. A `null` value deletes the key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigurationPatch {
    pub server: BTreeMap<String, Value>,
    pub client: BTreeMap<String, Value>,
}

impl ConfigurationPatch {
    pub fn is_empty(&self) -> bool {
        self.server.is_empty() && self.client.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyOutcome {
    /// Writes flushed to `server.config`.
    pub server: usize,
    /// Writes flushed to `client.config`.
    pub client: usize,
    /// Sensitive keys left untouched because the request echoed the mask.
    pub preserved: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AdminStoreService {
    sensitive_fields: Arc<[String]>,
    cache_namespace: Namespace,
}

impl AdminStoreService {
    pub fn new(settings: &AdminSettings) -> Self {
        Self {
            sensitive_fields: settings.sensitive_fields.iter().cloned().collect(),
            cache_namespace: settings.cache_namespace.clone(),
        }
    }

    pub fn cache_namespace(&self) -> &Namespace {
        &self.cache_namespace
    }

    /// Wipe the ephemeral namespace. Configuration namespaces are never touched.
    pub async fn clear_cache(&self, stores: &RequestStores) -> Result<u64, StoreError> {
        let cache = stores.store(&self.cache_namespace).await?;
        let removed = cache.clear().await?;
        info!(
            target = "soffio_kv::application::admin",
            namespace = %self.cache_namespace,
            removed,
            "cache cleared"
        );
        Ok(removed)
    }

    pub async fn load_configuration(
        &self,
        stores: &RequestStores,
    ) -> Result<ConfigurationView, StoreError> {
        let server = stores.server_config().await?.all().await?;
        let client = stores.client_config().await?.all().await?;

        Ok(ConfigurationView {
            server: self.mask_entries(server),
            client: self.mask_entries(client),
        })
    }

    /// Masked listing of any configured namespace.
    pub async fn list_namespace(
        &self,
        stores: &RequestStores,
        namespace: &Namespace,
    ) -> Result<BTreeMap<String, Value>, StoreError> {
        let entries = stores.store(namespace).await?.all().await?;
        Ok(self.mask_entries(entries))
    }

    /// Masked value of one key.
    pub async fn lookup(
        &self,
        stores: &RequestStores,
        namespace: &Namespace,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        let value = stores.store(namespace).await?.get(key).await?;
        Ok(value.map(|value| self.mask_value(key, value)))
    }

    /// Masked entries whose key ends with `suffix`.
    pub async fn lookup_suffix(
        &self,
        stores: &RequestStores,
        namespace: &Namespace,
        suffix: &str,
    ) -> Result<BTreeMap<String, Value>, StoreError> {
        let entries = stores.store(namespace).await?.entries_by_suffix(suffix).await?;
        Ok(self.mask_entries(entries))
    }

    /// Stage every field with deferred writes and flush each namespace once.
    ///
    /// Echoed masks are resolved against the stored value so a client that
    /// round-trips [`Self::load_configuration`] output never overwrites a
    /// secret with the placeholder.
    pub async fn apply_configuration(
        &self,
        stores: &RequestStores,
        patch: ConfigurationPatch,
    ) -> Result<ApplyOutcome, StoreError> {
        let mut outcome = ApplyOutcome::default();
        if patch.is_empty() {
            return Ok(outcome);
        }

        let server = stores.server_config().await?;
        let client = stores.client_config().await?;
        self.stage(&server, patch.server, &mut outcome.preserved).await?;
        self.stage(&client, patch.client, &mut outcome.preserved).await?;

        // Nothing staged means no backend round-trip.
        outcome.server = server.save().await?;
        outcome.client = client.save().await?;

        info!(
            target = "soffio_kv::application::admin",
            server = outcome.server,
            client = outcome.client,
            preserved = outcome.preserved.len(),
            "configuration applied"
        );
        Ok(outcome)
    }

    async fn stage(
        &self,
        store: &Store,
        fields: BTreeMap<String, Value>,
        preserved: &mut Vec<String>,
    ) -> Result<(), StoreError> {
        for (key, value) in fields {
            if value.is_null() {
                store.delete_deferred(&key)?;
                continue;
            }

            if self.is_sensitive(&key) && is_mask(&value) {
                preserved.push(key);
                continue;
            }

            let value = if self.has_nested_sensitive(&key) && contains_mask(&value) {
                let current = store.get(&key).await?;
                self.restore_masked(&key, value, current.as_ref())
            } else {
                value
            };
            store.set_deferred(&key, value)?;
        }
        Ok(())
    }

    fn is_sensitive(&self, key: &str) -> bool {
        self.sensitive_fields.iter().any(|field| field == key)
    }

    fn has_nested_sensitive(&self, key: &str) -> bool {
        self.sensitive_fields
            .iter()
            .any(|field| nested_path(field, key).is_some())
    }

    fn mask_entries(&self, entries: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        entries
            .into_iter()
            .map(|(key, value)| {
                let masked = self.mask_value(&key, value);
                (key, masked)
            })
            .collect()
    }

    /// Mask `value` stored under `key`.
    ///
    /// A sensitive field either names a key exactly (`ai.api_key`) or a path
    /// into an object stored under a shorter key (`ai` → `{"api_key": ..}`).
    pub fn mask_value(&self, key: &str, mut value: Value) -> Value {
        if self.is_sensitive(key) {
            return mask_leaf(value);
        }
        for field in self.sensitive_fields.iter() {
            if let Some(path) = nested_path(field, key) {
                if let Some(leaf) = pointer_mut(&mut value, path) {
                    *leaf = mask_leaf(leaf.take());
                }
            }
        }
        value
    }

    fn restore_masked(&self, key: &str, mut incoming: Value, current: Option<&Value>) -> Value {
        for field in self.sensitive_fields.iter() {
            let Some(path) = nested_path(field, key) else {
                continue;
            };
            let Some(leaf) = pointer_mut(&mut incoming, path) else {
                continue;
            };
            if !is_mask(leaf) {
                continue;
            }
            match current.and_then(|current| pointer(current, path)) {
                Some(previous) => *leaf = previous.clone(),
                None => *leaf = Value::Null,
            }
        }
        incoming
    }
}

fn nested_path<'a>(field: &'a str, key: &str) -> Option<&'a str> {
    field
        .strip_prefix(key)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|rest| !rest.is_empty())
}

fn pointer<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |node, segment| node.as_object()?.get(segment))
}

fn pointer_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(value, |node, segment| node.as_object_mut()?.get_mut(segment))
}

/// Empty values stay visible so the admin UI can tell "unset" from "set".
fn mask_leaf(value: Value) -> Value {
    match &value {
        Value::Null => value,
        Value::String(text) if text.is_empty() => value,
        _ => Value::String(MASK.to_string()),
    }
}

fn is_mask(value: &Value) -> bool {
    value.as_str() == Some(MASK)
}

fn contains_mask(value: &Value) -> bool {
    match value {
        Value::String(text) => text == MASK,
        Value::Array(items) => items.iter().any(contains_mask),
        Value::Object(map) => map_contains_mask(map),
        _ => false,
    }
}

fn map_contains_mask(map: &Map<String, Value>) -> bool {
    map.values().any(contains_mask)
}
