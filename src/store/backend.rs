//! Persistence seam between the store facade and its two storage variants.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{BackendKind, Entry, Namespace, StoreError, Value};

/// A write staged in a store instance and not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    Upsert(Value),
    Delete,
}

/// Staged writes keyed by entry key; the last staged write for a key wins.
pub type WriteBatch = BTreeMap<String, PendingWrite>;

/// Storage for exactly one namespace.
///
/// Implementations are constructed already bound to their namespace and never
/// touch entries outside it. Missing keys are `Ok(None)`, never an error.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn namespace(&self) -> &Namespace;

    async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError>;

    /// Upsert a single entry and persist it before returning.
    async fn put(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Remove a single entry. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every entry whose key starts with `prefix`, returning how many went.
    async fn remove_prefix(&self, prefix: &str) -> Result<u64, StoreError>;

    /// Entries whose key ends with `suffix`, ordered by key.
    async fn scan_suffix(&self, suffix: &str) -> Result<Vec<Entry>, StoreError>;

    /// Every entry in the namespace, ordered by key.
    async fn scan_all(&self) -> Result<Vec<Entry>, StoreError>;

    /// Remove every entry in the namespace, returning how many went.
    async fn clear(&self) -> Result<u64, StoreError>;

    /// Persist a batch of staged writes with as few round trips as the
    /// backend allows. Callers never pass an empty batch.
    async fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError>;
}
