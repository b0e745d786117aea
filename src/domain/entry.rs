//! Stored records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{error::StoreError, namespace::Namespace};

/// Structured value held by an entry.
///
/// A tagged variant over null, booleans, numbers, strings, arrays and
/// string-keyed maps. Maps serialize with sorted keys, so every backend writes
/// the same bytes for the same value.
pub type Value = serde_json::Value;

const MAX_KEY_LEN: usize = 512;

/// A single `(namespace, key) -> value` record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Value and timestamp of an entry without its addressing, as persisted
/// inside an object blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl StoredValue {
    pub fn now(value: Value) -> Self {
        Self {
            value,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn into_entry(self, namespace: &Namespace, key: String) -> Entry {
        Entry {
            namespace: namespace.clone(),
            key,
            value: self.value,
            updated_at: self.updated_at,
        }
    }
}

/// Keys are opaque, but must be non-empty and bounded.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::invalid_key("key must not be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StoreError::invalid_key(format!(
            "key exceeds {MAX_KEY_LEN} bytes"
        )));
    }
    if key.contains('\0') {
        return Err(StoreError::invalid_key("key must not contain NUL"));
    }
    Ok(())
}
