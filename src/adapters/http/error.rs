//! API error type and the JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::revenue::IngestError;

/// Standard error response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }
}

/// Converts handler failures into HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    Ingest(IngestError),
    Domain(DomainError),
    BadRequest { code: &'static str, message: String },
    NotFound { code: &'static str, message: String },
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::NotFound {
            code,
            message: message.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::Ingest(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Ingest(err) => (
                err.status_code(),
                ErrorResponse::new(err.code(), err.to_string()),
            ),
            ApiError::Domain(err) => {
                let status = match err.code {
                    ErrorCode::ValidationFailed | ErrorCode::InvalidFormat => {
                        StatusCode::BAD_REQUEST
                    }
                    ErrorCode::EventNotFound
                    | ErrorCode::SubscriptionNotFound
                    | ErrorCode::NotificationNotFound => StatusCode::NOT_FOUND,
                    ErrorCode::InvalidStateTransition | ErrorCode::ConcurrentModification => {
                        StatusCode::CONFLICT
                    }
                    ErrorCode::DatabaseError
                    | ErrorCode::SerializationError
                    | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
                };
                // Storage details stay in the logs.
                let message = if status.is_server_error() {
                    tracing::error!(error = %err, "Request failed");
                    "Internal error".to_string()
                } else {
                    err.message
                };
                (status, ErrorResponse::new(err.code.to_string(), message))
            }
            ApiError::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new(code, message))
            }
            ApiError::NotFound { code, message } => {
                (StatusCode::NOT_FOUND, ErrorResponse::new(code, message))
            }
        };
        (status, Json(body)).into_response()
    }
}
