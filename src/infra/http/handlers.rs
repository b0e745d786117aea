use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::admin::{ApplyOutcome, ConfigurationPatch, ConfigurationView};
use crate::application::error::AppError;
use crate::domain::{Namespace, Value};
use crate::store::RequestStores;

use super::{AdminState, db_health_response};

#[derive(Debug, Serialize)]
pub(super) struct ClearedCache {
    namespace: String,
    removed: u64,
}

pub(super) async fn health(State(state): State<AdminState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub(super) async fn clear_cache(
    State(state): State<AdminState>,
    Extension(stores): Extension<Arc<RequestStores>>,
) -> Result<Json<ClearedCache>, AppError> {
    let removed = state.admin.clear_cache(&stores).await?;
    Ok(Json(ClearedCache {
        namespace: state.admin.cache_namespace().to_string(),
        removed,
    }))
}

pub(super) async fn load_configuration(
    State(state): State<AdminState>,
    Extension(stores): Extension<Arc<RequestStores>>,
) -> Result<Json<ConfigurationView>, AppError> {
    Ok(Json(state.admin.load_configuration(&stores).await?))
}

pub(super) async fn apply_configuration(
    State(state): State<AdminState>,
    Extension(stores): Extension<Arc<RequestStores>>,
    Json(patch): Json<ConfigurationPatch>,
) -> Result<Json<ApplyOutcome>, AppError> {
    Ok(Json(state.admin.apply_configuration(&stores, patch).await?))
}

pub(super) async fn list_namespace(
    State(state): State<AdminState>,
    Extension(stores): Extension<Arc<RequestStores>>,
    Path(namespace): Path<String>,
) -> Result<Json<BTreeMap<String, Value>>, AppError> {
    let namespace = Namespace::new(namespace)?;
    Ok(Json(state.admin.list_namespace(&stores, &namespace).await?))
}
