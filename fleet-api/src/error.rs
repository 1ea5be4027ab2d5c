//! Error-to-HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// API-facing error. Wraps the domain error and maps each kind to one
/// status code and one stable token.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] fleet_core::Error),
}

/// Error body: `error` is the stable machine token, `message` is for
/// humans.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Core(err) = self;
        let status = match &err {
            fleet_core::Error::NotFound(_) => StatusCode::NOT_FOUND,
            fleet_core::Error::Forbidden(_) => StatusCode::FORBIDDEN,
            fleet_core::Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            fleet_core::Error::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            fleet_core::Error::Conflict(_) => StatusCode::CONFLICT,
            fleet_core::Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            fleet_core::Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(%err, "internal error");
        }

        let message = match &err {
            // The variant prefix is already the token; strip it from
            // the human text.
            fleet_core::Error::NotFound(m)
            | fleet_core::Error::Forbidden(m)
            | fleet_core::Error::Unauthorized(m)
            | fleet_core::Error::InvalidStatus(m)
            | fleet_core::Error::Conflict(m)
            | fleet_core::Error::BadRequest(m)
            | fleet_core::Error::Internal(m) => m.clone(),
        };

        let body = ErrorResponse {
            error: err.kind().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;
