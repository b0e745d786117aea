use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};
use time::OffsetDateTime;
use tracing::warn;

use crate::domain::{BackendKind, Entry, Namespace, StoreError, Value};
use crate::store::{Backend, PendingWrite, WriteBatch};

use super::{escape_like, map_sqlx_error};

// Postgres caps bind parameters per statement at 65535; three per row.
const UPSERT_CHUNK_ROWS: usize = 1000;

#[derive(sqlx::FromRow)]
struct KvRow {
    key: String,
    value: Json<Value>,
    updated_at: OffsetDateTime,
}

impl KvRow {
    fn into_entry(self, namespace: &Namespace) -> Entry {
        Entry {
            namespace: namespace.clone(),
            key: self.key,
            value: self.value.0,
            updated_at: self.updated_at,
        }
    }
}

/// Rows of one namespace in the shared `kv_entries` table.
pub struct RelationalBackend {
    namespace: Namespace,
    pool: Arc<PgPool>,
}

impl RelationalBackend {
    pub(super) fn new(namespace: Namespace, pool: Arc<PgPool>) -> Self {
        Self { namespace, pool }
    }

    fn failed(&self, op: &'static str, err: sqlx::Error) -> StoreError {
        let mapped = map_sqlx_error(err);
        warn!(
            target = "soffio_kv::infra::db",
            namespace = %self.namespace,
            op,
            error = %mapped,
            "relational backend operation failed"
        );
        mapped
    }

    async fn scan_pattern(&self, pattern: Option<String>) -> Result<Vec<Entry>, StoreError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT key, value, updated_at FROM kv_entries WHERE namespace = ");
        qb.push_bind(self.namespace.as_str());
        if let Some(pattern) = pattern {
            qb.push(" AND key LIKE ");
            qb.push_bind(pattern);
            qb.push(" ESCAPE '\\'");
        }
        qb.push(" ORDER BY key");

        let rows: Vec<KvRow> = qb
            .build_query_as()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|err| self.failed("scan", err))?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_entry(&self.namespace))
            .collect())
    }
}

#[async_trait]
impl Backend for RelationalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        let row: Option<KvRow> = sqlx::query_as(
            r#"
            SELECT key, value, updated_at
            FROM kv_entries
            WHERE namespace = $1 AND key = $2
            "#,
        )
        .bind(self.namespace.as_str())
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|err| self.failed("get", err))?;

        Ok(row.map(|row| row.into_entry(&self.namespace)))
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, namespace, value, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (key, namespace) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(self.namespace.as_str())
        .bind(Json(value))
        .execute(self.pool.as_ref())
        .await
        .map_err(|err| self.failed("put", err))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_entries WHERE namespace = $1 AND key = $2")
            .bind(self.namespace.as_str())
            .bind(key)
            .execute(self.pool.as_ref())
            .await
            .map_err(|err| self.failed("remove", err))?;

        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM kv_entries
            WHERE namespace = $1 AND key LIKE $2 ESCAPE '\'
            "#,
        )
        .bind(self.namespace.as_str())
        .bind(format!("{}%", escape_like(prefix)))
        .execute(self.pool.as_ref())
        .await
        .map_err(|err| self.failed("remove_prefix", err))?;

        Ok(result.rows_affected())
    }

    async fn scan_suffix(&self, suffix: &str) -> Result<Vec<Entry>, StoreError> {
        self.scan_pattern(Some(format!("%{}", escape_like(suffix))))
            .await
    }

    async fn scan_all(&self) -> Result<Vec<Entry>, StoreError> {
        self.scan_pattern(None).await
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE namespace = $1")
            .bind(self.namespace.as_str())
            .execute(self.pool.as_ref())
            .await
            .map_err(|err| self.failed("clear", err))?;

        Ok(result.rows_affected())
    }

    async fn apply(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut upserts = Vec::new();
        let mut deletes = Vec::new();
        for (key, write) in batch {
            match write {
                PendingWrite::Upsert(value) => upserts.push((key.as_str(), value)),
                PendingWrite::Delete => deletes.push(key.clone()),
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| self.failed("apply.begin", err))?;

        for chunk in upserts.chunks(UPSERT_CHUNK_ROWS) {
            let mut qb: QueryBuilder<'_, Postgres> =
                QueryBuilder::new("INSERT INTO kv_entries (key, namespace, value, updated_at) ");
            qb.push_values(chunk, |mut row, (key, value)| {
                row.push_bind(*key)
                    .push_bind(self.namespace.as_str())
                    .push_bind(Json(*value))
                    .push("now()");
            });
            qb.push(
                " ON CONFLICT (key, namespace) DO UPDATE SET \
                 value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
            );
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(|err| self.failed("apply.upsert", err))?;
        }

        if !deletes.is_empty() {
            sqlx::query("DELETE FROM kv_entries WHERE namespace = $1 AND key = ANY($2)")
                .bind(self.namespace.as_str())
                .bind(&deletes)
                .execute(&mut *tx)
                .await
                .map_err(|err| self.failed("apply.delete", err))?;
        }

        tx.commit()
            .await
            .map_err(|err| self.failed("apply.commit", err))?;

        Ok(())
    }
}
