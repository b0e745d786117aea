use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use super::{ObjectStore, ObjectStoreError};

/// In-process object store for tests and single-node development.
///
/// Records the key of every successful `put` and can be switched into a
/// failing mode to exercise unavailability handling.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Bytes>>,
    writes: RwLock<Vec<String>>,
    unavailable: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Keys written so far, in write order.
    pub fn write_log(&self) -> Vec<String> {
        match self.writes.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Current body of `key`, bypassing the failure switch.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        match self.objects.read() {
            Ok(guard) => guard.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn check_available(&self) -> Result<(), ObjectStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Unavailable(
                "memory object store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ObjectStoreError> {
        self.check_available()?;
        Ok(self.object(key))
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), ObjectStoreError> {
        self.check_available()?;
        {
            let mut objects = match self.objects.write() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    warn!(
                        target = "soffio_kv::infra::objects",
                        "Recovered from poisoned memory object store"
                    );
                    poisoned.into_inner()
                }
            };
            objects.insert(key.to_string(), body);
        }
        match self.writes.write() {
            Ok(mut guard) => guard.push(key.to_string()),
            Err(poisoned) => poisoned.into_inner().push(key.to_string()),
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.check_available()?;
        match self.objects.write() {
            Ok(mut guard) => guard.remove(key),
            Err(poisoned) => poisoned.into_inner().remove(key),
        };
        Ok(())
    }
}
