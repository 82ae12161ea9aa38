//! Error taxonomy shared by the fetcher, the renderer and the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Every failure the service can report. One tag per call, no partial results.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller-supplied data was rejected (bad URL, blocked address, empty body...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Request body or fetched response exceeded its ceiling.
    #[error("request body too large")]
    PayloadTooLarge,

    /// Fetch or render exceeded its deadline.
    #[error("request timeout")]
    Timeout,

    /// The converter failed or produced nothing. Detail is for server logs only.
    #[error("pdf generation failed: {0}")]
    PdfGeneration(String),

    /// Anything else unexpected.
    #[error("internal: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn pdf_generation(message: impl Into<String>) -> Self {
        Self::PdfGeneration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status for this error kind.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::PdfGeneration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code used in response bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Timeout => "timeout",
            Self::PdfGeneration(_) => "pdf_generation_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show to the caller. Diagnostic text from the
    /// converter or from internal failures never leaves the process.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidInput(_) => self.to_string(),
            Self::PayloadTooLarge => "Request body too large".to_string(),
            Self::Timeout => "Request timeout".to_string(),
            Self::PdfGeneration(_) => "PDF generation failed".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match &self {
            Self::PdfGeneration(_) => error!(err = %self, "PDF generation error"),
            Self::Internal(_) => error!(err = %self, "Internal error"),
            _ => {}
        }

        let body = ErrorResponse {
            error: self.error_code(),
            message: self.public_message(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ServiceError::invalid_input("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::Timeout.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            ServiceError::PayloadTooLarge.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ServiceError::pdf_generation("wk failed").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::internal("disk").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ServiceError::invalid_input("x").error_code(), "invalid_input");
        assert_eq!(ServiceError::Timeout.error_code(), "timeout");
        assert_eq!(ServiceError::PayloadTooLarge.error_code(), "payload_too_large");
        assert_eq!(
            ServiceError::pdf_generation("x").error_code(),
            "pdf_generation_failed"
        );
        assert_eq!(ServiceError::internal("x").error_code(), "internal_error");
    }

    #[test]
    fn test_diagnostics_not_leaked() {
        let err = ServiceError::pdf_generation("wkhtmltopdf failed: /tmp/secret/input.html");
        assert_eq!(err.public_message(), "PDF generation failed");

        let err = ServiceError::internal("failed to create temp dir: permission denied");
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_invalid_input_message_is_shown() {
        let err = ServiceError::invalid_input("url scheme must be http or https");
        assert_eq!(
            err.public_message(),
            "invalid input: url scheme must be http or https"
        );
    }
}
