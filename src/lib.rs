//! Namespaced key/value store with relational and object-storage backends.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod store;
pub mod util;

pub use domain::{BackendKind, Entry, Namespace, NamespaceBinding, StoreError, Value};
pub use store::{BackendRegistry, RequestStores, Store, StoreFactory};
