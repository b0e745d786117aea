use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use soffio_kv::application::admin::{AdminStoreService, MASK};
use soffio_kv::config::AdminSettings;
use soffio_kv::domain::{BackendKind, Namespace, NamespaceBinding};
use soffio_kv::infra::http::{AdminState, build_router};
use soffio_kv::infra::objects::{MemoryObjectStore, ObjectStore};
use soffio_kv::store::{BackendRegistry, RequestStores, StoreFactory};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    factory: Arc<dyn StoreFactory>,
}

impl TestApp {
    fn new() -> Self {
        let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        // No database here, so the configuration namespaces are plain object
        // namespaces for the purpose of exercising the HTTP surface.
        let registry = BackendRegistry::new(
            [
                NamespaceBinding::new(Namespace::cache(), BackendKind::Object, false),
                NamespaceBinding::new(Namespace::server_config(), BackendKind::Object, false),
                NamespaceBinding::new(Namespace::client_config(), BackendKind::Object, false),
            ],
            None,
            objects,
            "kv",
        )
        .expect("registry");
        let factory: Arc<dyn StoreFactory> = Arc::new(registry);

        let state = AdminState {
            factory: Arc::clone(&factory),
            admin: Arc::new(AdminStoreService::new(&AdminSettings::default())),
            db: None,
        };
        Self {
            router: build_router(state),
            factory,
        }
    }

    fn stores(&self) -> RequestStores {
        RequestStores::new(Arc::clone(&self.factory))
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }
}

#[tokio::test]
async fn health_without_database_is_no_content() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn clear_cache_leaves_configuration_alone() {
    let app = TestApp::new();
    let stores = app.stores();
    let cache = stores.cache().await.expect("cache");
    cache
        .set("feeds_normal_0_20", json!(["a"]))
        .await
        .expect("seed cache");
    cache.set("moments_0_10", json!([])).await.expect("seed cache");
    stores
        .client_config()
        .await
        .expect("client")
        .set("site.title", json!("Soffio"))
        .await
        .expect("seed config");

    let (status, body) = app.send(Method::POST, "/admin/cache/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"namespace": "cache", "removed": 2}));

    let after = app.stores();
    assert!(after.cache().await.expect("cache").all().await.expect("all").is_empty());
    assert_eq!(
        after
            .client_config()
            .await
            .expect("client")
            .get("site.title")
            .await
            .expect("get"),
        Some(json!("Soffio"))
    );
}

#[tokio::test]
async fn configuration_view_masks_secrets() {
    let app = TestApp::new();
    let server = app.stores().server_config().await.expect("server");
    server
        .set("ai.api_key", json!("sk-live-123"))
        .await
        .expect("seed");
    server
        .set(
            "oauth",
            json!({"client_id": "abc", "client_secret": "hunter2"}),
        )
        .await
        .expect("seed");

    let (status, body) = app.send(Method::GET, "/admin/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server"]["ai.api_key"], json!(MASK));
    assert_eq!(
        body["server"]["oauth"],
        json!({"client_id": "abc", "client_secret": MASK})
    );
    assert_eq!(body["client"], json!({}));
}

#[tokio::test]
async fn echoed_masks_keep_stored_secrets() {
    let app = TestApp::new();
    let server = app.stores().server_config().await.expect("server");
    server
        .set("ai.api_key", json!("sk-live-123"))
        .await
        .expect("seed");
    server
        .set(
            "oauth",
            json!({"client_id": "abc", "client_secret": "hunter2"}),
        )
        .await
        .expect("seed");

    let patch = json!({
        "server": {
            "ai.api_key": MASK,
            "oauth": {"client_id": "xyz", "client_secret": MASK},
        },
        "client": {"site.title": "Renamed"},
    });
    let (status, body) = app.send(Method::PUT, "/admin/config", Some(patch)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server"], json!(1));
    assert_eq!(body["client"], json!(1));
    assert_eq!(body["preserved"], json!(["ai.api_key"]));

    let stores = app.stores();
    let server = stores.server_config().await.expect("server");
    assert_eq!(
        server.get("ai.api_key").await.expect("get"),
        Some(json!("sk-live-123"))
    );
    assert_eq!(
        server.get("oauth").await.expect("get"),
        Some(json!({"client_id": "xyz", "client_secret": "hunter2"}))
    );
    assert_eq!(
        stores
            .client_config()
            .await
            .expect("client")
            .get("site.title")
            .await
            .expect("get"),
        Some(json!("Renamed"))
    );
}

#[tokio::test]
async fn null_in_patch_deletes_key() {
    let app = TestApp::new();
    app.stores()
        .client_config()
        .await
        .expect("client")
        .set("banner", json!("hello"))
        .await
        .expect("seed");

    let patch = json!({"client": {"banner": null}});
    let (status, _) = app.send(Method::PUT, "/admin/config", Some(patch)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = app.send(Method::GET, "/admin/kv/client.config", None).await;
    assert_eq!(listing, json!({}));
}

#[tokio::test]
async fn namespace_listing_masks_and_validates() {
    let app = TestApp::new();
    app.stores()
        .server_config()
        .await
        .expect("server")
        .set("ai.api_key", json!("sk-live-123"))
        .await
        .expect("seed");

    let (status, body) = app.send(Method::GET, "/admin/kv/server.config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ai.api_key": MASK}));

    let (status, body) = app.send(Method::GET, "/admin/kv/volatile", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));

    let (status, body) = app.send(Method::GET, "/admin/kv/bad!name", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("bad_request"));
}

#[tokio::test]
async fn single_key_and_suffix_lookups_mask_secrets() {
    let app = TestApp::new();
    let stores = app.stores();
    let server = stores.server_config().await.expect("server");
    server
        .set("ai.api_key", json!("sk-live-123"))
        .await
        .expect("set secret");
    server
        .set("oauth", json!({"client_id": "abc", "client_secret": "hunter2"}))
        .await
        .expect("set nested secret");
    server.set("site.api_key", json!("public")).await.expect("set");

    let admin = AdminStoreService::new(&AdminSettings::default());
    let namespace = Namespace::server_config();

    let value = admin
        .lookup(&stores, &namespace, "ai.api_key")
        .await
        .expect("lookup");
    assert_eq!(value, Some(json!(MASK)));
    let missing = admin
        .lookup(&stores, &namespace, "ai.missing")
        .await
        .expect("lookup");
    assert_eq!(missing, None);

    let by_suffix = admin
        .lookup_suffix(&stores, &namespace, "api_key")
        .await
        .expect("suffix");
    assert_eq!(by_suffix.get("ai.api_key"), Some(&json!(MASK)));
    assert_eq!(by_suffix.get("site.api_key"), Some(&json!("public")));
    assert_eq!(by_suffix.len(), 2);

    let nested = admin
        .lookup_suffix(&stores, &namespace, "oauth")
        .await
        .expect("suffix");
    assert_eq!(
        nested.get("oauth"),
        Some(&json!({"client_id": "abc", "client_secret": MASK}))
    );
}
