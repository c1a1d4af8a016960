//! Error types for the Vanish server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StoreError;
use crate::upload::UploadError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
}

/// Error response body
///
/// Only a coarse error code and a client-facing message; details stay in the
/// server log.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

fn storage_status(e: &StoreError) -> (StatusCode, &'static str, String) {
    match e {
        // Missing blobs are reported as a plain bad request
        StoreError::NotFound(_) => (
            StatusCode::BAD_REQUEST,
            "not_found",
            "File not found".to_string(),
        ),
        StoreError::Forbidden(_) => (
            StatusCode::FORBIDDEN,
            "forbidden",
            "Forbidden file identifier".to_string(),
        ),
        StoreError::Collision(_) => (
            StatusCode::CONFLICT,
            "collision",
            "Identifier collision, retry the upload".to_string(),
        ),
        StoreError::Io(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            "Storage error".to_string(),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Storage(e) => {
                tracing::warn!("Storage error: {}", e);
                storage_status(e)
            }
            AppError::Upload(e) => {
                tracing::warn!("Upload rejected: {}", e);
                match e {
                    UploadError::Validation(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_upload", msg.clone())
                    }
                    UploadError::TooLarge { max, .. } => (
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "payload_too_large",
                        format!("Upload exceeds {} bytes", max),
                    ),
                    UploadError::Read(_) => (
                        StatusCode::BAD_REQUEST,
                        "read_error",
                        "Failed to read upload".to_string(),
                    ),
                    UploadError::Store(store) => storage_status(store),
                }
            }
        };

        let body = Json(ErrorResponse {
            error: error_type,
            message,
        });

        (status, body).into_response()
    }
}
