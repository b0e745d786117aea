use std::sync::Arc;

use serde_json::json;
use soffio_kv::domain::{BackendKind, Namespace, NamespaceBinding, StoreError};
use soffio_kv::infra::db::PostgresKv;
use soffio_kv::infra::objects::{MemoryObjectStore, ObjectStore};
use soffio_kv::store::{BackendRegistry, RequestStores, Store};
use sqlx::PgPool;

fn store(pool: &PgPool, namespace: Namespace) -> Store {
    Store::new(Box::new(PostgresKv::new(pool.clone()).backend(namespace)))
}

#[sqlx::test(migrations = "./migrations")]
async fn set_get_and_delete_round_trip(pool: PgPool) {
    let cache = store(&pool, Namespace::cache());

    cache
        .set("feeds_normal_0_20", json!({"ids": [3, 2, 1], "total": 3}))
        .await
        .expect("set");
    assert_eq!(
        store(&pool, Namespace::cache())
            .get("feeds_normal_0_20")
            .await
            .expect("get"),
        Some(json!({"ids": [3, 2, 1], "total": 3}))
    );

    cache.set("feeds_normal_0_20", json!("replaced")).await.expect("upsert");
    assert_eq!(
        cache.get("feeds_normal_0_20").await.expect("get"),
        Some(json!("replaced"))
    );

    cache.delete("feeds_normal_0_20").await.expect("delete");
    assert_eq!(cache.get("feeds_normal_0_20").await.expect("get"), None);
}

#[sqlx::test(migrations = "./migrations")]
async fn prefix_and_suffix_match_literally(pool: PgPool) {
    let cache = store(&pool, Namespace::cache());
    for key in [
        "feeds_normal_0_20",
        "feeds_draft_0_20",
        "feedsXnormal",
        "7_previous_feed_12",
        "9_previous_feed_112",
        "100%_previous_feed_12",
    ] {
        cache.set(key, json!(key)).await.expect("set");
    }

    // `_` must not act as a wildcard.
    assert_eq!(cache.delete_prefix("feeds_").await.expect("delete_prefix"), 2);
    assert_eq!(
        cache.get("feedsXnormal").await.expect("get"),
        Some(json!("feedsXnormal"))
    );
    assert_eq!(cache.delete_prefix("feeds_").await.expect("idempotent"), 0);

    let values = cache
        .get_by_suffix("_previous_feed_12")
        .await
        .expect("suffix");
    assert_eq!(
        values,
        vec![json!("100%_previous_feed_12"), json!("7_previous_feed_12")]
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn namespaces_share_the_table_but_not_keys(pool: PgPool) {
    let server = store(&pool, Namespace::server_config());
    let client = store(&pool, Namespace::client_config());

    server.set("site.title", json!("server")).await.expect("set");
    client.set("site.title", json!("client")).await.expect("set");

    assert_eq!(server.clear().await.expect("clear"), 1);
    assert_eq!(
        client.get("site.title").await.expect("get"),
        Some(json!("client"))
    );

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_entries")
        .fetch_one(&pool)
        .await
        .expect("count rows");
    assert_eq!(rows, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn save_applies_batch_atomically(pool: PgPool) {
    let server = store(&pool, Namespace::server_config());
    server.set("stale", json!(true)).await.expect("seed");

    for index in 0..25 {
        server
            .set_deferred(&format!("field.{index}"), json!(index))
            .expect("stage");
    }
    server.delete_deferred("stale").expect("stage delete");
    assert!(
        store(&pool, Namespace::server_config())
            .get("field.0")
            .await
            .expect("get")
            .is_none()
    );

    assert_eq!(server.save().await.expect("save"), 26);

    let all = store(&pool, Namespace::server_config())
        .all()
        .await
        .expect("all");
    assert_eq!(all.len(), 25);
    assert_eq!(all.get("field.24"), Some(&json!(24)));
    assert!(!all.contains_key("stale"));
}

#[sqlx::test(migrations = "./migrations")]
async fn nul_bytes_are_rejected_not_reported_as_outage(pool: PgPool) {
    let server = store(&pool, Namespace::server_config());

    let err = server
        .set("site.title", json!("a\u{0}b"))
        .await
        .expect_err("jsonb cannot hold NUL");
    assert!(matches!(err, StoreError::Serialization(_)), "{err:?}");
    assert!(!err.is_unavailable());

    assert!(matches!(
        server.set("site\u{0}title", json!("ok")).await,
        Err(StoreError::InvalidKey { .. })
    ));

    server
        .set_deferred("site.title", json!("a\u{0}b"))
        .expect("stage");
    let err = server.save().await.expect_err("batch with NUL fails");
    assert!(matches!(err, StoreError::Serialization(_)), "{err:?}");
    assert_eq!(server.get("site.title").await.expect("get"), Some(json!("a\u{0}b")));

    server.set("site.title", json!("fine")).await.expect("usable afterwards");
    assert_eq!(
        store(&pool, Namespace::server_config())
            .get("site.title")
            .await
            .expect("get"),
        Some(json!("fine"))
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn secrets_stay_out_of_object_storage(pool: PgPool) {
    let memory = Arc::new(MemoryObjectStore::new());
    let objects: Arc<dyn ObjectStore> = memory.clone();

    let registry = BackendRegistry::new(
        NamespaceBinding::defaults(),
        Some(PostgresKv::new(pool)),
        objects,
        "kv",
    )
    .expect("default bindings");
    let stores = RequestStores::new(Arc::new(registry));

    let server = stores.server_config().await.expect("server");
    assert_eq!(server.backend_kind(), BackendKind::Relational);
    server
        .set("ai.api_key", json!("sk-live-123"))
        .await
        .expect("set secret");
    stores
        .cache()
        .await
        .expect("cache")
        .set("feeds_normal_0_20", json!([]))
        .await
        .expect("set cache");

    let written = memory.write_log();
    assert_eq!(written, vec!["kv/cache.json".to_string()]);
    assert!(!written.iter().any(|key| key.contains("server.config")));
}
