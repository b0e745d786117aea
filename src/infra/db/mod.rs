//! Postgres-backed relational storage.

mod kv;
mod util;

pub use kv::RelationalBackend;
pub use util::{escape_like, map_sqlx_error};

use std::sync::Arc;

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::domain::Namespace;

/// Shared handle on the `kv_entries` table; hands out one
/// [`RelationalBackend`] per namespace.
#[derive(Clone)]
pub struct PostgresKv {
    pool: Arc<PgPool>,
}

impl PostgresKv {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    /// Backend scoped to `namespace`, sharing this pool.
    pub fn backend(&self, namespace: Namespace) -> RelationalBackend {
        RelationalBackend::new(namespace, Arc::clone(&self.pool))
    }
}
