//! Connection pool construction.

use std::str::FromStr;
use std::time::Duration;

use fleet_core::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Open a pool on the given `DATABASE_URL` (e.g. `sqlite://fleet.db`).
///
/// Foreign keys are switched on for every connection so that the
/// cascade rules in the schema actually fire.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| Error::Internal(format!("invalid database url: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| Error::Internal(format!("connect database: {e}")))
}

/// In-memory database for tests. A single connection keeps every query
/// on the same memory store.
pub async fn connect_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| Error::Internal(format!("invalid database url: {e}")))?
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| Error::Internal(format!("connect database: {e}")))
}
