use crate::validation::{FieldErrors, SubmissionError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by the HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Path address is not a checksummed address
    #[error("invalid ethereum address")]
    InvalidAddress,
    #[error("not found")]
    NotFound,
    /// Malformed query parameters
    #[error("bad request: {0}")]
    BadRequest(FieldErrors),
    /// Rejected submission
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SubmissionError> for ApiError {
    fn from(e: SubmissionError) -> Self {
        match e {
            SubmissionError::Invalid(errors) => ApiError::Validation(errors),
            SubmissionError::Store(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidAddress => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!("Invalid ethereum address"))).into_response()
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response(),
            ApiError::BadRequest(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            ApiError::Validation(errors) => (StatusCode::UNPROCESSABLE_ENTITY, Json(errors)).into_response(),
            ApiError::Internal(e) => {
                error!("Request failed: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
