use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Gateway error types with explicit status mapping
///
/// Cryptographic and parsing failures never reach this enum: the token codec
/// collapses them into a boolean verification outcome. What surfaces here is
/// only what a client is allowed to see as an HTTP status.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Access denied")]
    GeoDenied,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<&GateError> for StatusCode {
    fn from(err: &GateError) -> Self {
        match err {
            GateError::MissingAuth => StatusCode::UNAUTHORIZED,
            GateError::InvalidToken => StatusCode::UNAUTHORIZED,
            GateError::MissingCredentials => StatusCode::BAD_REQUEST,
            GateError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            GateError::GeoDenied => StatusCode::FORBIDDEN,
            GateError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GateError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GateError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GateError> for StatusCode {
    fn from(err: GateError) -> Self {
        From::from(&err)
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> axum::response::Response {
        let status: StatusCode = From::from(&self);

        // Upstream and internal detail stays in server logs only; the client
        // gets a generic message.
        let message = match &self {
            GateError::Upstream(detail) => {
                tracing::error!(error = %detail, "upstream request failed");
                "Internal server error".to_string()
            }
            GateError::InternalError(detail) => {
                tracing::error!(error = %detail, "internal error");
                "Internal server error".to_string()
            }
            GateError::ConfigError(detail) => {
                tracing::error!(error = %detail, "configuration error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        GateError::Upstream(format!("HTTP request failed: {}", err))
    }
}
