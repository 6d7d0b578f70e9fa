//! Error types for the onboarding proxy.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

/// Top-level error type for a proxied onboarding request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "MAYADESTEK_API_KEY is missing. Put your backend secret into .env.local (local) or the \
         deployment environment (production), then restart the server."
    )]
    MissingApiKey,

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Problems with the inbound form submission.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Body is null (request.json failed)")]
    InvalidJson { reason: String },

    #[error("Missing required fields: student_name, student_phone")]
    MissingFields { received: Value, normalized: Value },
}

/// Upstream backend failures that are reported back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Backend rejected request ({status})")]
    Rejected { url: String, status: u16, body: Value },
}

impl ValidationError {
    /// Parser detail behind a [`ValidationError::InvalidJson`], for logs only.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationError::InvalidJson { reason } => Some(reason),
            ValidationError::MissingFields { .. } => None,
        }
    }
}

impl ProxyError {
    /// HTTP status the caller receives for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Config(_) | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Validation(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(UpstreamError::Rejected { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }

    /// JSON body for this error, tagged with the build identifier.
    pub fn to_body(&self, build: &str) -> Value {
        match self {
            ProxyError::Config(e) => json!({ "build": build, "error": e.to_string() }),
            ProxyError::Validation(e @ ValidationError::InvalidJson { .. }) => json!({
                "build": build,
                "error": e.to_string(),
                "hint": "Check Content-Type and JSON payload",
            }),
            ProxyError::Validation(
                e @ ValidationError::MissingFields {
                    received,
                    normalized,
                },
            ) => json!({
                "build": build,
                "error": e.to_string(),
                "received": received,
                "normalized": normalized,
            }),
            ProxyError::Upstream(e @ UpstreamError::Rejected { url, status, body }) => json!({
                "build": build,
                "error": e.to_string(),
                "backend": { "url": url, "status": status, "body": body },
            }),
            ProxyError::Internal(_) => json!({ "build": build, "error": self.to_string() }),
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        ProxyError::Internal(e.to_string())
    }
}

/// A [`ProxyError`] paired with the build identifier it is reported under.
#[derive(Debug)]
pub struct ErrorResponse {
    pub build: String,
    pub error: ProxyError,
}

impl ErrorResponse {
    pub fn new(build: impl Into<String>, error: impl Into<ProxyError>) -> Self {
        Self {
            build: build.into(),
            error: error.into(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (
            self.error.status_code(),
            Json(self.error.to_body(&self.build)),
        )
            .into_response()
    }
}

/// Result type alias for the proxy.
pub type Result<T> = std::result::Result<T, ProxyError>;
