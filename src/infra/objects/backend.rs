use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::histogram;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{BackendKind, Entry, Namespace, StoreError, StoredValue, Value};
use crate::store::{Backend, PendingWrite, WriteBatch};

use super::{ObjectStore, ObjectStoreError};

const BLOB_VERSION: u32 = 1;

type EntryMap = BTreeMap<String, StoredValue>;

/// Serialized body of a namespace object.
#[derive(Debug, Default, Serialize, Deserialize)]
struct NamespaceBlob {
    version: u32,
    entries: EntryMap,
}

/// A whole namespace persisted as one object.
///
/// The first operation loads the object and keeps the decoded map for the
/// lifetime of this backend; reads are answered from that map. Every
/// immediate mutation uploads the full map again. A batch flush re-reads the
/// object first so entries written by other instances since the load are
/// kept.
pub struct ObjectBackend {
    namespace: Namespace,
    object_key: String,
    objects: Arc<dyn ObjectStore>,
    snapshot: Mutex<Option<EntryMap>>,
}

impl ObjectBackend {
    pub fn new(namespace: Namespace, objects: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        let object_key = object_key(prefix, &namespace);
        Self {
            namespace,
            object_key,
            objects,
            snapshot: Mutex::new(None),
        }
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    fn failed(&self, op: &'static str, err: ObjectStoreError) -> StoreError {
        warn!(
            target = "soffio_kv::infra::objects",
            namespace = %self.namespace,
            object = %self.object_key,
            store = self.objects.name(),
            op,
            error = %err,
            "object backend operation failed"
        );
        StoreError::unavailable(BackendKind::Object, err)
    }

    async fn fetch(&self) -> Result<EntryMap, StoreError> {
        let Some(body) = self
            .objects
            .get(&self.object_key)
            .await
            .map_err(|err| self.failed("get", err))?
        else {
            return Ok(EntryMap::new());
        };

        let blob: NamespaceBlob =
            serde_json::from_slice(&body).map_err(StoreError::serialization)?;
        if blob.version != BLOB_VERSION {
            return Err(StoreError::serialization(format!(
                "object `{}` has unsupported version {}",
                self.object_key, blob.version
            )));
        }
        Ok(blob.entries)
    }

    async fn upload(&self, entries: &EntryMap) -> Result<(), StoreError> {
        let body = serde_json::to_vec(&NamespaceBlobRef {
            version: BLOB_VERSION,
            entries,
        })
        .map_err(StoreError::serialization)?;

        histogram!(
            "soffio_kv_object_upload_bytes",
            "namespace" => self.namespace.to_string()
        )
        .record(body.len() as f64);
        debug!(
            target = "soffio_kv::infra::objects",
            namespace = %self.namespace,
            object = %self.object_key,
            entries = entries.len(),
            bytes = body.len(),
            "uploading namespace object"
        );

        self.objects
            .put(&self.object_key, Bytes::from(body))
            .await
            .map_err(|err| self.failed("put", err))
    }

    async fn loaded<'a>(
        &self,
        slot: &'a mut Option<EntryMap>,
    ) -> Result<&'a mut EntryMap, StoreError> {
        let map = match slot.take() {
            Some(map) => map,
            None => self.fetch().await?,
        };
        Ok(slot.insert(map))
    }

    /// Apply `change` to a copy of the map, upload it when anything changed,
    /// and only then make it the cached map.
    async fn mutate<F>(&self, change: F) -> Result<u64, StoreError>
    where
        F: FnOnce(&mut EntryMap) -> u64 + Send,
    {
        let mut slot = self.snapshot.lock().await;
        let current = self.loaded(&mut slot).await?;

        let mut next = current.clone();
        let changed = change(&mut next);
        if changed == 0 {
            return Ok(0);
        }

        self.upload(&next).await?;
        *current = next;
        Ok(changed)
    }

    async fn read<T, F>(&self, view: F) -> Result<T, StoreError>
    where
        F: FnOnce(&EntryMap) -> T + Send,
    {
        let mut slot = self.snapshot.lock().await;
        let current = self.loaded(&mut slot).await?;
        Ok(view(current))
    }

    fn entries_matching(&self, map: &EntryMap, matches: impl Fn(&str) -> bool) -> Vec<Entry> {
        map.iter()
            .filter(|(key, _)| matches(key.as_str()))
            .map(|(key, stored)| stored.clone().into_entry(&self.namespace, key.clone()))
            .collect()
    }
}

#[derive(Serialize)]
struct NamespaceBlobRef<'a> {
    version: u32,
    entries: &'a EntryMap,
}

fn object_key(prefix: &str, namespace: &Namespace) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{namespace}.json")
    } else {
        format!("{prefix}/{namespace}.json")
    }
}

#[async_trait]
impl Backend for ObjectBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Object
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        self.read(|map| {
            map.get(key)
                .cloned()
                .map(|stored| stored.into_entry(&self.namespace, key.to_string()))
        })
        .await
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let stored = StoredValue::now(value.clone());
        self.mutate(move |map| {
            map.insert(key.to_string(), stored);
            1
        })
        .await
        .map(|_| ())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.mutate(|map| u64::from(map.remove(key).is_some()))
            .await
            .map(|_| ())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        self.mutate(|map| {
            let before = map.len();
            map.retain(|key, _| !key.starts_with(prefix));
            (before - map.len()) as u64
        })
        .await
    }

    async fn scan_suffix(&self, suffix: &str) -> Result<Vec<Entry>, StoreError> {
        self.read(|map| self.entries_matching(map, |key| key.ends_with(suffix)))
            .await
    }

    async fn scan_all(&self) -> Result<Vec<Entry>, StoreError> {
        self.read(|map| self.entries_matching(map, |_| true)).await
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        self.mutate(|map| {
            let removed = map.len() as u64;
            map.clear();
            removed
        })
        .await
    }

    async fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut slot = self.snapshot.lock().await;

        let mut merged = self.fetch().await?;
        for (key, write) in batch {
            match write {
                PendingWrite::Upsert(value) => {
                    merged.insert(key.clone(), StoredValue::now(value.clone()));
                }
                PendingWrite::Delete => {
                    merged.remove(key);
                }
            }
        }

        self.upload(&merged).await?;
        *slot = Some(merged);
        Ok(())
    }
}
