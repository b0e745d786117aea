//! Core types shared by the store facade, its backends and the application layer.

pub mod entry;
pub mod error;
pub mod keys;
pub mod namespace;

pub use entry::{Entry, StoredValue, Value, validate_key};
pub use error::StoreError;
pub use namespace::{BackendKind, Namespace, NamespaceBinding};
