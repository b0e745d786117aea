//! Namespaced key/value store.
//!
//! One [`Store`] serves one namespace through one [`Backend`]:
//!
//! - **Relational**: rows in the shared `kv_entries` table
//! - **Object**: the whole namespace as a single serialized blob
//!
//! Which backend a namespace uses is decided once, by the
//! [`BackendRegistry`] built from configuration. Request handlers reach
//! stores through a [`RequestStores`] container created per request.

mod backend;
mod container;
mod facade;
mod lock;
mod registry;
mod staged;

pub use backend::{Backend, PendingWrite, WriteBatch};
pub use container::RequestStores;
pub use facade::Store;
pub use registry::{BackendRegistry, StoreFactory};
