use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::TokenError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(#[from] TokenError),

    #[error("Bad request: {0}")]
    Validation(String),

    #[error("Backend timed out after {attempts} attempt(s)")]
    BackendTimeout { attempts: u32 },

    #[error("Could not connect to backend after {attempts} attempt(s): {detail}")]
    BackendConnect { attempts: u32, detail: String },

    #[error("Backend returned HTTP {status} after {attempts} attempt(s)")]
    BackendStatus { status: u16, attempts: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::Auth(e) => (StatusCode::UNAUTHORIZED, e.code()),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::BackendTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "BACKEND_TIMEOUT"),
            AppError::BackendConnect { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE")
            }
            AppError::BackendStatus { .. } => (StatusCode::BAD_GATEWAY, "BACKEND_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let message = self.to_string();
        tracing::error!("Request failed: {} - {}", code, message);

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
