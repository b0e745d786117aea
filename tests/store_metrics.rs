use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use soffio_kv::domain::{BackendKind, Namespace, NamespaceBinding};
use soffio_kv::infra::objects::{MemoryObjectStore, ObjectStore};
use soffio_kv::store::{BackendRegistry, RequestStores};

#[tokio::test]
async fn store_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
    let registry = BackendRegistry::new(
        [NamespaceBinding::new(
            Namespace::cache(),
            BackendKind::Object,
            false,
        )],
        None,
        objects,
        "kv",
    )
    .expect("registry");
    let stores = RequestStores::new(Arc::new(registry));
    let cache = stores.cache().await.expect("cache");

    // get hit/miss, immediate and deferred writes, flush, invalidation
    assert!(cache.get("feeds_normal_0_20").await.expect("miss").is_none());
    cache
        .set("feeds_normal_0_20", json!(["a"]))
        .await
        .expect("set");
    assert!(cache.get("feeds_normal_0_20").await.expect("hit").is_some());
    cache.set_deferred("moments_0_10", json!([])).expect("stage");
    cache.save().await.expect("save");
    cache.delete_prefix("feeds_").await.expect("invalidate");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "soffio_kv_get_total",
        "soffio_kv_write_total",
        "soffio_kv_flush_total",
        "soffio_kv_invalidate_total",
        "soffio_kv_object_upload_bytes",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
