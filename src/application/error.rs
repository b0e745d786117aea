use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{domain::StoreError, infra::error::InfraError};

/// Diagnostic chain attached to error responses and consumed by the
/// response logger.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNAVAILABLE: &str = "backend_unavailable";
    pub const SERIALIZATION: &str = "serialization_error";
    pub const MISCONFIGURED: &str = "misconfigured";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorMessage,
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub code: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Store(StoreError::Unavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(StoreError::UnknownNamespace { .. }) | AppError::NotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::Store(StoreError::InvalidKey { .. })
            | AppError::Store(StoreError::InvalidNamespace { .. })
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Store(StoreError::Serialization(_))
            | AppError::Store(StoreError::SecretPlacement { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(InfraError::Store(err)) if err.is_unavailable() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Infra(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Store(StoreError::Unavailable { .. })
            | AppError::Infra(InfraError::Database { .. }) => codes::UNAVAILABLE,
            AppError::Store(StoreError::UnknownNamespace { .. }) | AppError::NotFound => {
                codes::NOT_FOUND
            }
            AppError::Store(StoreError::InvalidKey { .. })
            | AppError::Store(StoreError::InvalidNamespace { .. })
            | AppError::Validation(_) => codes::BAD_REQUEST,
            AppError::Store(StoreError::Serialization(_)) => codes::SERIALIZATION,
            AppError::Store(StoreError::SecretPlacement { .. })
            | AppError::Infra(InfraError::Configuration { .. }) => codes::MISCONFIGURED,
            AppError::Infra(_) | AppError::Unexpected(_) => codes::INTERNAL,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable",
            StatusCode::NOT_FOUND => "Resource not found",
            StatusCode::BAD_REQUEST => "Request could not be processed",
            _ => "Unexpected error occurred",
        }
    }

    /// Client-facing detail; only validation-class errors carry one.
    fn hint(&self) -> Option<String> {
        match self {
            AppError::Validation(message) => Some(message.clone()),
            AppError::Store(
                err @ (StoreError::InvalidKey { .. }
                | StoreError::InvalidNamespace { .. }
                | StoreError::UnknownNamespace { .. }),
            ) => Some(err.to_string()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: ErrorMessage {
                code: self.code(),
                message: self.presentation_message(),
                hint: self.hint(),
            },
        };
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BackendKind;

    #[test]
    fn unavailable_backend_maps_to_503() {
        let err = AppError::from(StoreError::unavailable(BackendKind::Object, "timeout"));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), codes::UNAVAILABLE);
    }

    #[test]
    fn unknown_namespace_maps_to_404_with_hint() {
        let err = AppError::from(StoreError::UnknownNamespace {
            namespace: "volatile".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.hint().expect("hint").contains("volatile"));
    }

    #[test]
    fn serialization_is_an_internal_error_without_hint() {
        let err = AppError::from(StoreError::serialization("bad json"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.hint().is_none());
    }

    #[test]
    fn response_carries_error_report() {
        let response = AppError::validation("value must be an object").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, "application::error::AppError");
    }
}
