//! Administrative HTTP surface.

mod handlers;
mod middleware;

pub use middleware::{RequestContext, attach_request_stores, log_responses, set_request_context};

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sqlx::Error as SqlxError;

use crate::application::{admin::AdminStoreService, error::ErrorReport};
use crate::infra::db::PostgresKv;
use crate::store::StoreFactory;

#[derive(Clone)]
pub struct AdminState {
    pub factory: Arc<dyn StoreFactory>,
    pub admin: Arc<AdminStoreService>,
    /// Absent when every namespace lives in object storage.
    pub db: Option<PostgresKv>,
}

pub fn build_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/admin/cache/clear", post(handlers::clear_cache))
        .route(
            "/admin/config",
            get(handlers::load_configuration).put(handlers::apply_configuration),
        )
        .route("/admin/kv/{namespace}", get(handlers::list_namespace))
        .layer(from_fn_with_state(state.clone(), attach_request_stores))
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
        .with_state(state)
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
