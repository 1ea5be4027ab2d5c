//! Error types shared across the control plane.

use thiserror::Error;

/// Domain errors produced by the core services.
///
/// Each variant maps to exactly one HTTP status and one stable error
/// token at the API boundary (see `fleet-api`). The carried string is
/// the human-oriented message; the token is derived from the variant.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine token for API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Forbidden(_) => "forbidden",
            Error::Unauthorized(_) => "unauthorized",
            Error::InvalidStatus(_) => "invalid_status",
            Error::Conflict(_) => "conflict",
            Error::BadRequest(_) => "bad_request",
            Error::Internal(_) => "internal_error",
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
