//! API error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("business rule violated: {0}")]
    BusinessRule(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn business_rule(msg: impl Into<String>) -> Self {
        Self::BusinessRule(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::BusinessRule(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation",
            ApiError::BusinessRule(_) => "business_rule",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::RateLimited => "rate_limited",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl From<narravo_catalog::CatalogError> for ApiError {
    fn from(e: narravo_catalog::CatalogError) -> Self {
        use narravo_catalog::CatalogError as CE;
        match e {
            CE::NotFound { kind, id } => ApiError::NotFound(format!("{kind} {id}")),
            CE::Conflict(msg) | CE::BusinessRule(msg) => ApiError::BusinessRule(msg),
            CE::VersionMismatch(msg) => ApiError::BusinessRule(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<narravo_queue::QueueError> for ApiError {
    fn from(e: narravo_queue::QueueError) -> Self {
        match e {
            narravo_queue::QueueError::EnqueueFailed(msg) => {
                ApiError::BusinessRule(format!("task already queued: {msg}"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// The canonical error envelope.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: bool,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    timestamp: chrono::DateTime<Utc>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorEnvelope {
            error: true,
            code: self.code(),
            message: self.to_string(),
            details: None,
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_errors_map_to_http_semantics() {
        let not_found: ApiError =
            narravo_catalog::CatalogError::not_found("chapter", "c-1").into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let conflict: ApiError =
            narravo_catalog::CatalogError::business_rule("already confirmed").into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn envelope_shape() {
        let body = ErrorEnvelope {
            error: true,
            code: "validation",
            message: "bad input".into(),
            details: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"error\":true"));
        assert!(json.contains("\"code\":\"validation\""));
        assert!(!json.contains("details"));
        assert!(json.contains("timestamp"));
    }
}
