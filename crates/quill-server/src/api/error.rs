//! Unified API error handling with structured responses.

use std::error::Error as StdError;

use axum::{
    Json,
    extract::{Request, rejection::JsonRejection},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use quill_patch::{DiffStoreError, PatchError};
use quill_protocol::ValidationError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// A failure with a caller-chosen status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// Anything not classified above. Always a 500.
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: msg.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) | Self::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Status { status, .. } => *status,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) | Self::Unhandled(_) => "INTERNAL_ERROR",
            Self::Status { status, .. } => code_for_status(*status),
        }
    }

    /// The error and its causes, one per line.
    pub fn stack(&self) -> String {
        let mut stack = self.to_string();
        let mut source: Option<&(dyn StdError + 'static)> = match self {
            Self::Unhandled(err) => err.source(),
            other => other.source(),
        };
        while let Some(cause) = source {
            stack.push_str("\n  caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        stack
    }
}

fn code_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::FORBIDDEN => "FORBIDDEN",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::CONFLICT => "CONFLICT",
        StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
        StatusCode::UNPROCESSABLE_ENTITY => "UNPROCESSABLE_ENTITY",
        StatusCode::TOO_MANY_REQUESTS => "TOO_MANY_REQUESTS",
        StatusCode::SERVICE_UNAVAILABLE => "SERVICE_UNAVAILABLE",
        StatusCode::GATEWAY_TIMEOUT => "GATEWAY_TIMEOUT",
        s if s.is_client_error() => "CLIENT_ERROR",
        _ => "INTERNAL_ERROR",
    }
}

/// Structured error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Stashed on every error response so [`expose_error_stack`] can add it.
#[derive(Debug, Clone)]
struct ErrorStack(ErrorResponse);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        match &self {
            ApiError::Internal(_) | ApiError::Unhandled(_) => {
                error!(error_code = code, message = %message, "API error");
            }
            ApiError::ServiceUnavailable(_) => {
                warn!(error_code = code, message = %message, "Service unavailable");
            }
            ApiError::Status { status, .. } if status.is_server_error() => {
                error!(error_code = code, status = status.as_u16(), message = %message, "API error");
            }
            _ => {
                tracing::debug!(error_code = code, message = %message, "Client error");
            }
        }

        let body = ErrorResponse {
            error: message,
            code,
            stack: None,
        };
        let detailed = ErrorResponse {
            stack: Some(self.stack()),
            ..body.clone()
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorStack(detailed));
        response
    }
}

/// Middleware for development: replace error bodies with ones carrying `stack`.
pub async fn expose_error_stack(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    match response.extensions().get::<ErrorStack>().cloned() {
        Some(ErrorStack(detailed)) => (response.status(), Json(detailed)).into_response(),
        None => response,
    }
}

/// Body for panics caught by `CatchPanicLayer`.
pub fn panic_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else if let Some(text) = panic.downcast_ref::<&str>() {
        text.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<PatchError> for ApiError {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            PatchError::Malformed { .. } => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<DiffStoreError> for ApiError {
    fn from(err: DiffStoreError) -> Self {
        match err {
            DiffStoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            DiffStoreError::Duplicate(_) => ApiError::Conflict(err.to_string()),
            DiffStoreError::Patch(patch) => patch.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::NotAllowed { .. } => ApiError::BadRequest(err.to_string()),
            StoreError::Database(_) => ApiError::Unhandled(anyhow::Error::new(err)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(ValidationError::EmptyPrompt).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DiffStoreError::NotFound("d1".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        let conflict = PatchError::Conflict {
            hunk: 1,
            line: 1,
            expected: "a\n".into(),
            found: None,
        };
        assert_eq!(ApiError::from(conflict).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_with_status() {
        let err = ApiError::with_status(StatusCode::GATEWAY_TIMEOUT, "upstream slow");
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.error_code(), "GATEWAY_TIMEOUT");
        assert_eq!(err.to_string(), "upstream slow");

        let err = ApiError::with_status(StatusCode::IM_A_TEAPOT, "short and stout");
        assert_eq!(err.error_code(), "CLIENT_ERROR");
    }

    #[test]
    fn test_stack_lists_causes() {
        let err = anyhow::anyhow!("disk full").context("saving draft");
        let stack = ApiError::from(err).stack();
        assert_eq!(stack, "saving draft\n  caused by: disk full");
    }

    #[test]
    fn test_response_hides_stack() {
        let response = ApiError::bad_request("nope").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let stashed = response.extensions().get::<ErrorStack>().unwrap();
        assert_eq!(stashed.0.stack.as_deref(), Some("Bad request: nope"));
    }
}
