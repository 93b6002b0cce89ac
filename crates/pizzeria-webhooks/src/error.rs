//! Error types for the inbound webhook surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Webhook error variants.
///
/// Display strings are what the caller sees, so the signature and address
/// variants stay generic. Specific reasons are logged where they are
/// detected.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Unknown webhook provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Internal server error")]
    Internal(String),
}

/// JSON error response returned by webhook endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl WebhookError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebhookError::Forbidden => StatusCode::FORBIDDEN,
            WebhookError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = match &self {
            WebhookError::Unauthorized => "unauthorized",
            WebhookError::Forbidden => "forbidden",
            WebhookError::UnknownProvider(_) => "unknown_provider",
            WebhookError::InvalidPayload(_) => "invalid_payload",
            WebhookError::Internal(detail) => {
                tracing::error!(target: "webhook_gate", error = %detail, "Webhook handling failed");
                "internal_error"
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, WebhookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(WebhookError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(WebhookError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            WebhookError::UnknownProvider("stripe".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            WebhookError::InvalidPayload("eof".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_detail_not_displayed() {
        let err = WebhookError::Internal("sink queue closed".into());
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn test_into_response_status() {
        let response = WebhookError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
