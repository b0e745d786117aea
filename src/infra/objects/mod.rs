//! Object storage: one blob per key, read and written whole.

mod backend;
mod fs;
mod memory;

pub use backend::ObjectBackend;
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal get/put/delete object store contract.
///
/// Keys are `/`-separated relative paths. A missing object reads as `None`
/// and deleting one succeeds.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// A name for logs.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ObjectStoreError>;

    /// Write an object, replacing any previous body.
    async fn put(&self, key: &str, body: Bytes) -> Result<(), ObjectStoreError>;

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
}
