use axum::http::header::{ALLOW, RETRY_AFTER};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Batch Errors
///
/// A malformed line in the URL batch is reported as [`AppError::InvalidUrl`]
/// and answered with 500, the same class as a failed body read. A batch that
/// is simply too large is a client error and maps to 400.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Method {0} is not allowed")]
    MethodNotAllowed(Method),

    #[error("Rate limit of {limit} requests exceeded")]
    RateLimited { limit: u64, retry_after_secs: u64 },

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("'{0}' is not a URL")]
    InvalidUrl(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl AppError {
    /// HTTP status this error is answered with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::BodyRead(_)
            | AppError::InvalidUrl(_)
            | AppError::Internal(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Client mistakes are routine, server-side failures are not
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let (error_type, message) = match &self {
            AppError::BadRequest(msg) => ("bad_request", msg.clone()),
            AppError::MethodNotAllowed(_) => (
                "method_not_allowed",
                "Only POST method supported.".to_string(),
            ),
            AppError::RateLimited { .. } => (
                "rate_limited",
                "Rate limit exceeded. Please retry later.".to_string(),
            ),
            // The offending line is the caller's own input, safe to echo back
            AppError::InvalidUrl(_) => ("invalid_url", self.to_string()),
            AppError::BodyRead(_) => (
                "body_read_error",
                "Failed to read request body.".to_string(),
            ),
            AppError::Internal(_) => (
                "internal_error",
                "An internal error occurred. Please contact support if the issue persists."
                    .to_string(),
            ),
            AppError::ConfigError(_) => (
                "config_error",
                "Service configuration error. Please contact support.".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        let mut response = (status, axum::Json(body)).into_response();
        let headers = response.headers_mut();
        match self {
            AppError::MethodNotAllowed(_) => {
                headers.insert(ALLOW, HeaderValue::from_static("POST"));
            }
            AppError::RateLimited {
                limit,
                retry_after_secs,
            } => {
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                headers.insert(
                    HeaderName::from_static("x-ratelimit-limit"),
                    HeaderValue::from(limit),
                );
                headers.insert(
                    HeaderName::from_static("x-ratelimit-remaining"),
                    HeaderValue::from_static("0"),
                );
            }
            _ => {}
        }
        response
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
