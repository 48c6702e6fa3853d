//! Error types for the HTTP service

use crate::responses::ErrorResponse;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use axum::BoxError;
use queue_gateway_core::GatewayError;
use std::time::Duration;
use tracing::{error, warn};

/// Handler errors with HTTP status code mapping
///
/// - `413 Payload Too Large`: the body exceeds the configured limit
/// - `422 Unprocessable Entity`: the request body is malformed or fails
///   validation. Checked before any broker call.
/// - `500 Internal Server Error`: any broker failure, or the request ran past
///   `server.timeout_seconds`. The client receives a short cause; the full
///   error chain is logged server-side.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    BodyTooLarge(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Request timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("Request could not be processed: {0}")]
    Middleware(String),
}

impl ApiError {
    /// Classify a failure raised by a tower middleware layer
    pub fn from_middleware(error: BoxError, timeout: Duration) -> Self {
        if error.is::<tower::timeout::error::Elapsed>() {
            Self::TimedOut(timeout)
        } else {
            Self::Middleware(error.to_string())
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::BodyTooLarge(rejection.body_text());
        }
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::InvalidRequest(reason) => {
                warn!(reason = %reason, "Rejected request body");
                (StatusCode::UNPROCESSABLE_ENTITY, reason)
            }
            Self::BodyTooLarge(reason) => {
                warn!(reason = %reason, "Rejected oversized request body");
                (StatusCode::PAYLOAD_TOO_LARGE, reason)
            }
            Self::Gateway(e) if e.is_client_error() => {
                warn!(error = %e, "Rejected payload");
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            Self::TimedOut(after) => {
                error!(timeout_seconds = after.as_secs(), "Request timed out");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("An error occurred: {}", self),
                )
            }
            Self::Middleware(ref message) => {
                error!(error = %message, "Middleware failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("An error occurred: {}", self),
                )
            }
            Self::Gateway(e) => {
                error!(
                    error = %e,
                    chain = %error_chain(&e),
                    transient = e.is_transient(),
                    "Queue operation failed"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("An error occurred: {}", e),
                )
            }
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

/// Render an error and all of its sources on one line
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),
}
