//! Error types and handling for the chat gateway.
//!
//! [`GatewayError`] covers every failure the pipeline can observe. Most of them
//! never reach the HTTP layer: the pipeline resolves them into in-band error
//! chunks or the fallback stream. Only requests rejected before streaming
//! starts are turned into an HTTP error response.

use crate::core::error_types::{
    ERROR_TYPE_API, ERROR_TYPE_CONFIGURATION, ERROR_TYPE_INVALID_REQUEST, ERROR_TYPE_TIMEOUT,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A required provider credential is absent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network-level failure talking to a provider.
    #[error("Provider transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("Provider returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// Provider did not answer within the configured timeout.
    #[error("Provider timed out after {0} seconds")]
    Timeout(u64),

    /// One provider event line could not be decoded.
    #[error("Malformed provider event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    /// Client provided invalid data
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl GatewayError {
    /// Short label used for metrics and log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::Configuration(_) => "configuration",
            GatewayError::Transport(_) => "transport",
            GatewayError::UpstreamStatus { .. } => "upstream_status",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::MalformedEvent(_) => "malformed_event",
            GatewayError::BadRequest(_) => "bad_request",
        }
    }

    /// Classify a reqwest failure, surfacing timeouts with the budget that was exceeded.
    pub fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(timeout_secs)
        } else {
            GatewayError::Transport(err)
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            GatewayError::BadRequest(_) | GatewayError::MalformedEvent(_) => {
                (StatusCode::BAD_REQUEST, ERROR_TYPE_INVALID_REQUEST)
            }
            GatewayError::Configuration(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, ERROR_TYPE_CONFIGURATION)
            }
            GatewayError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, ERROR_TYPE_TIMEOUT),
            GatewayError::UpstreamStatus { status, .. } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                ERROR_TYPE_API,
            ),
            GatewayError::Transport(_) => (StatusCode::BAD_GATEWAY, ERROR_TYPE_API),
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results using [`GatewayError`].
pub type Result<T> = std::result::Result<T, GatewayError>;
