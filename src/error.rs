//! # Error Handling
//!
//! Unified `application/problem+json` error responses for the repo-sync API,
//! carrying the request trace ID for correlation with logs.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::connectors::ProviderError;
use crate::sync_service::SyncServiceError;
use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Trace ID of the running request, or a short correlation ID outside one.
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(String::into_boxed_str)
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<SyncServiceError> for ApiError {
    fn from(error: SyncServiceError) -> Self {
        match error {
            SyncServiceError::NotFound(_) => not_found(),
            SyncServiceError::InactiveRepository(id) => Self::new(
                StatusCode::CONFLICT,
                "REPOSITORY_INACTIVE",
                "Repository connection is inactive",
            )
            .with_details(json!({ "repository_id": id })),
            SyncServiceError::SyncAlreadyInProgress(id) => Self::new(
                StatusCode::CONFLICT,
                "SYNC_IN_PROGRESS",
                "A sync is already in progress for this repository",
            )
            .with_details(json!({ "repository_id": id })),
            SyncServiceError::Validation(message) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
            }
            SyncServiceError::Duplicate(full_name) => Self::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                "Repository is already connected",
            )
            .with_details(json!({ "full_name": full_name })),
            SyncServiceError::Provider(provider) => provider.into(),
            SyncServiceError::Crypto(err) => {
                tracing::error!(error = %err, "Token cipher failure");
                internal_error()
            }
            SyncServiceError::Database(err) => {
                tracing::error!(error = ?err, "Database error");
                internal_error()
            }
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(error: ProviderError) -> Self {
        match &error {
            ProviderError::AuthenticationFailure => Self::new(
                StatusCode::UNAUTHORIZED,
                "PROVIDER_AUTH_FAILED",
                "GitHub rejected the access token",
            ),
            ProviderError::RateLimitedOrForbidden { .. } => Self::new(
                StatusCode::FORBIDDEN,
                "PROVIDER_FORBIDDEN",
                &error.to_string(),
            ),
            ProviderError::ResourceNotFound { .. } => Self::new(
                StatusCode::NOT_FOUND,
                "PROVIDER_RESOURCE_NOT_FOUND",
                "Repository not found or not visible to the access token",
            ),
            ProviderError::ExternalServiceUnavailable { attempts, .. } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "PROVIDER_UNAVAILABLE",
                &error.to_string(),
            )
            .with_details(json!({ "provider": "github", "attempts": attempts }))
            .with_retry_after(PROVIDER_RETRY_AFTER_SECS),
            ProviderError::InvalidRepositoryName(_) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &error.to_string())
            }
            ProviderError::Configuration(_) => {
                tracing::error!(error = %error, "GitHub client misconfigured");
                Self::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", "GitHub request failed")
            }
        }
    }
}

/// Retry hint returned with `PROVIDER_UNAVAILABLE`.
const PROVIDER_RETRY_AFTER_SECS: u64 = 60;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("Invalid path parameter: {}", rejection.body_text()),
        )
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        match error {
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                internal_error()
            }
        }
    }
}

/// 404 without revealing whether the record exists for someone else
pub fn not_found() -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        "Repository connection not found",
    )
}

pub fn internal_error() -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_SERVER_ERROR",
        "An internal error occurred",
    )
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
        assert_eq!(error.retry_after, None);
    }

    #[test]
    fn test_content_type_and_retry_after_headers() {
        let response = ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "PROVIDER_UNAVAILABLE",
            "down",
        )
        .with_retry_after(60)
        .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get("retry-after").unwrap(), "60");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_trace_id_fallback_format() {
        let error = ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "X", "y");
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }

    #[test]
    fn test_service_error_mapping() {
        let id = Uuid::new_v4();
        let cases: Vec<(SyncServiceError, StatusCode, &str)> = vec![
            (SyncServiceError::NotFound(id), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                SyncServiceError::InactiveRepository(id),
                StatusCode::CONFLICT,
                "REPOSITORY_INACTIVE",
            ),
            (
                SyncServiceError::SyncAlreadyInProgress(id),
                StatusCode::CONFLICT,
                "SYNC_IN_PROGRESS",
            ),
            (
                SyncServiceError::Validation("bad name".into()),
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
            ),
            (
                SyncServiceError::Duplicate("acme/widgets".into()),
                StatusCode::CONFLICT,
                "CONFLICT",
            ),
            (
                SyncServiceError::Database(sea_orm::DbErr::Custom("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
            ),
        ];

        for (error, status, code) in cases {
            let api: ApiError = error.into();
            assert_eq!(api.status, status);
            assert_eq!(api.code.as_ref(), code);
        }
    }

    #[test]
    fn test_provider_error_mapping() {
        let auth: ApiError = ProviderError::AuthenticationFailure.into();
        assert_eq!(auth.status, StatusCode::UNAUTHORIZED);
        assert_eq!(auth.code.as_ref(), "PROVIDER_AUTH_FAILED");

        let forbidden: ApiError = ProviderError::RateLimitedOrForbidden {
            operation: "fetch_commits for acme/widgets".into(),
        }
        .into();
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

        let missing: ApiError = ProviderError::ResourceNotFound {
            resource: "/repos/acme/widgets".into(),
        }
        .into();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.code.as_ref(), "PROVIDER_RESOURCE_NOT_FOUND");

        let unavailable: ApiError = ProviderError::ExternalServiceUnavailable {
            operation: "fetch_commits for acme/widgets".into(),
            attempts: 3,
            last_error: "GitHub responded 500".into(),
        }
        .into();
        assert_eq!(unavailable.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.retry_after, Some(PROVIDER_RETRY_AFTER_SECS));
        assert_eq!(unavailable.details.unwrap()["attempts"], 3);
    }
}
