//! The namespaced store every call site talks to.

use std::{collections::BTreeMap, future::Future, sync::Mutex};

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::domain::{BackendKind, Namespace, StoreError, Value, validate_key};

use super::backend::{Backend, PendingWrite};
use super::lock::mutex_lock;
use super::staged::{StagedWrites, Supersede};

const SOURCE: &str = "store::facade";

/// Key/value store bound to one namespace and one backend.
///
/// Writes are either persisted before the call returns (`set`, `delete`) or
/// staged in the instance (`set_deferred`, `delete_deferred`) until
/// [`Store::save`]. Staged writes are visible to reads on this instance
/// immediately and to other instances only after `save`. Dropping the store
/// discards anything still staged.
pub struct Store {
    namespace: Namespace,
    backend: Box<dyn Backend>,
    pending: Mutex<StagedWrites>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("namespace", &self.namespace)
            .field("backend", &self.backend.kind())
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl Store {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            namespace: backend.namespace().clone(),
            backend,
            pending: Mutex::new(StagedWrites::default()),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Number of staged writes waiting for [`Store::save`].
    pub fn pending_len(&self) -> usize {
        mutex_lock(&self.pending, SOURCE, "pending_len").len()
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;

        let staged = mutex_lock(&self.pending, SOURCE, "get").get(key).cloned();
        let value = match staged {
            Some(PendingWrite::Upsert(value)) => Some(value),
            Some(PendingWrite::Delete) => None,
            None => self.backend.get(key).await?.map(|entry| entry.value),
        };

        let result = if value.is_some() { "hit" } else { "miss" };
        counter!(
            "soffio_kv_get_total",
            "namespace" => self.namespace.to_string(),
            "result" => result
        )
        .increment(1);
        debug!(
            target = "soffio_kv::store",
            namespace = %self.namespace,
            key,
            result,
            "get"
        );

        Ok(value)
    }

    /// Typed lookup; a stored value that does not fit `T` is a serialization error.
    pub async fn get_as<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        self.get(key)
            .await?
            .map(|value| serde_json::from_value(value).map_err(StoreError::serialization))
            .transpose()
    }

    /// Like [`Store::get`] but substitutes `default` for a missing key. Never writes.
    pub async fn get_or_default(&self, key: &str, default: Value) -> Result<Value, StoreError> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Cache-aside lookup.
    ///
    /// Returns the stored value, or runs `factory`, persists its output under
    /// `key` and returns it. Concurrent callers on a cold key may each run the
    /// factory and each write; the last write wins. Factories must therefore
    /// be idempotent recomputations.
    pub async fn get_or_set<F, Fut, E>(&self, key: &str, factory: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
        E: From<StoreError>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = factory().await?;
        self.set(key, value.clone()).await?;
        Ok(value)
    }

    /// Upsert and persist before returning.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        validate_key(key)?;
        mutex_lock(&self.pending, SOURCE, "set")
            .supersede(Supersede::Key(key.to_string()));

        self.backend.put(key, &value).await?;
        self.record_write("immediate");
        debug!(
            target = "soffio_kv::store",
            namespace = %self.namespace,
            key,
            "set"
        );
        Ok(())
    }

    /// Serialize `value` and [`Store::set`] it.
    pub async fn set_as<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value).map_err(StoreError::serialization)?;
        self.set(key, value).await
    }

    /// Stage an upsert until the next [`Store::save`].
    pub fn set_deferred(&self, key: &str, value: Value) -> Result<(), StoreError> {
        validate_key(key)?;
        mutex_lock(&self.pending, SOURCE, "set_deferred")
            .stage(key.to_string(), PendingWrite::Upsert(value));
        self.record_write("deferred");
        Ok(())
    }

    /// Remove and persist before returning. Removing a missing key succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        mutex_lock(&self.pending, SOURCE, "delete")
            .supersede(Supersede::Key(key.to_string()));

        self.backend.remove(key).await?;
        self.record_write("immediate");
        debug!(
            target = "soffio_kv::store",
            namespace = %self.namespace,
            key,
            "delete"
        );
        Ok(())
    }

    /// Stage a removal until the next [`Store::save`].
    pub fn delete_deferred(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        mutex_lock(&self.pending, SOURCE, "delete_deferred")
            .stage(key.to_string(), PendingWrite::Delete);
        self.record_write("deferred");
        Ok(())
    }

    /// Persist every staged write in one backend flush.
    ///
    /// Returns the number of writes flushed; with nothing staged the backend
    /// is not touched. On failure the batch is staged again, except for keys
    /// that were re-staged, written, deleted or invalidated on this instance
    /// while the flush was in flight.
    pub async fn save(&self) -> Result<usize, StoreError> {
        let Some(batch) = mutex_lock(&self.pending, SOURCE, "save.take").take() else {
            return Ok(0);
        };
        let _flush = FlushInProgress { store: self };

        if let Err(err) = self.backend.apply(&batch.writes).await {
            warn!(
                target = "soffio_kv::store",
                namespace = %self.namespace,
                backend = %self.backend.kind(),
                writes = batch.writes.len(),
                error = %err,
                "flush failed; writes remain staged"
            );
            mutex_lock(&self.pending, SOURCE, "save.restore").restore(batch);
            return Err(err);
        }

        let flushed = batch.writes.len();
        counter!("soffio_kv_flush_total", "namespace" => self.namespace.to_string())
            .increment(1);
        info!(
            target = "soffio_kv::store",
            namespace = %self.namespace,
            backend = %self.backend.kind(),
            writes = flushed,
            "flushed staged writes"
        );
        Ok(flushed)
    }

    /// Remove every entry whose key starts with `prefix`, including staged
    /// ones. Applied immediately and idempotent.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        if prefix.is_empty() {
            return Err(StoreError::invalid_key(
                "prefix must not be empty; use clear() to wipe a namespace",
            ));
        }

        mutex_lock(&self.pending, SOURCE, "delete_prefix")
            .supersede(Supersede::Prefix(prefix.to_string()));

        let removed = self.backend.remove_prefix(prefix).await?;
        counter!("soffio_kv_invalidate_total", "namespace" => self.namespace.to_string())
            .increment(1);
        debug!(
            target = "soffio_kv::store",
            namespace = %self.namespace,
            prefix,
            removed,
            "delete_prefix"
        );
        Ok(removed)
    }

    /// Values of every key ending with `suffix`, ordered by key.
    pub async fn get_by_suffix(&self, suffix: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self.entries_by_suffix(suffix).await?.into_values().collect())
    }

    /// Like [`Self::get_by_suffix`], keeping the keys.
    pub async fn entries_by_suffix(
        &self,
        suffix: &str,
    ) -> Result<BTreeMap<String, Value>, StoreError> {
        let entries = self.backend.scan_suffix(suffix).await?;
        let mut merged: BTreeMap<String, Value> = entries
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect();
        self.overlay_pending(&mut merged, |key| key.ends_with(suffix));
        Ok(merged)
    }

    /// Snapshot of the whole namespace, staged writes included.
    pub async fn all(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        let entries = self.backend.scan_all().await?;
        let mut merged: BTreeMap<String, Value> = entries
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect();
        self.overlay_pending(&mut merged, |_| true);
        Ok(merged)
    }

    /// Delete every entry in the namespace and drop staged writes.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        mutex_lock(&self.pending, SOURCE, "clear").supersede(Supersede::All);

        let removed = self.backend.clear().await?;
        counter!("soffio_kv_invalidate_total", "namespace" => self.namespace.to_string())
            .increment(1);
        info!(
            target = "soffio_kv::store",
            namespace = %self.namespace,
            removed,
            "cleared namespace"
        );
        Ok(removed)
    }

    fn overlay_pending(&self, merged: &mut BTreeMap<String, Value>, matches: impl Fn(&str) -> bool) {
        let pending = mutex_lock(&self.pending, SOURCE, "overlay_pending");
        for (key, write) in pending.iter().filter(|(key, _)| matches(key.as_str())) {
            match write {
                PendingWrite::Upsert(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                PendingWrite::Delete => {
                    merged.remove(key);
                }
            }
        }
    }

    fn record_write(&self, mode: &'static str) {
        counter!(
            "soffio_kv_write_total",
            "namespace" => self.namespace.to_string(),
            "mode" => mode
        )
        .increment(1);
    }
}

/// Ends the flush bookkeeping even when `save` is cancelled mid-flight.
struct FlushInProgress<'a> {
    store: &'a Store,
}

impl Drop for FlushInProgress<'_> {
    fn drop(&mut self) {
        mutex_lock(&self.store.pending, SOURCE, "save.finish").finish_flush();
    }
}
