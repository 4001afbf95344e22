//! API request handlers

pub mod campaigns;
pub mod events;
pub mod health;

use axum::{http::StatusCode, Json};
use serde::Serialize;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal_error".to_string(),
            message: message.to_string(),
        }),
    )
}

pub(crate) fn not_found(message: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "not_found".to_string(),
            message: message.to_string(),
        }),
    )
}

pub(crate) fn validation_error(message: &str) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: "validation_error".to_string(),
            message: message.to_string(),
        }),
    )
}

pub(crate) fn conflict(message: &str) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse {
            error: "invalid_state".to_string(),
            message: message.to_string(),
        }),
    )
}
