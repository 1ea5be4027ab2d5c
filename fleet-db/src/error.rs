//! Mapping from storage failures to domain errors.

use fleet_core::Error;

/// Convert an `sqlx` error at the repo boundary.
///
/// Row-not-found becomes `not_found`, unique-constraint collisions
/// become `conflict`, everything else is internal.
pub fn db_err(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::RowNotFound => Error::NotFound("record not found".to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::Conflict(db.message().to_string())
        }
        _ => Error::Internal(err.to_string()),
    }
}
