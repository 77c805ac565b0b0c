//! API request handlers

pub mod campaigns;
pub mod health;
pub mod webhooks;

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::error;
use whatsjet_common::Error;

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<T, ApiError>;

pub fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

/// Map a domain error onto its HTTP status and code
pub fn api_error(e: Error) -> ApiError {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(code = e.code(), error = %e, "Request failed");
    }
    error_response(status, e.code(), e.to_string())
}
