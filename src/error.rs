use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid tool set configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tool schema failed to compile. Fatal for the owning tool set.
    #[error("Failed to load tools: {0}")]
    Load(String),

    /// The remote API answered with a non-2xx status.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Network failure or timeout before any response was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote similarity service is unreachable or erroring.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Whether the error originated from the remote side rather than local input.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            AppError::Api { .. } | AppError::Transport(_) | AppError::Discovery(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Config(msg) | AppError::Load(msg) => {
                tracing::error!(error = %msg, "Tool set error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::Api { status, body } => {
                tracing::warn!(status, body = %body, "Upstream API error");
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::Transport(msg) => {
                tracing::error!(error = %msg, "Transport error");
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::Discovery(msg) => {
                tracing::warn!(error = %msg, "Discovery error");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::Validation(msg) => {
                tracing::warn!(error = %msg, "Validation error");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = Json(ErrorResponse {
            error: message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
