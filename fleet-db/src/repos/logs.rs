//! Captured diagnostic lines. Every line carries an expiry; the janitor
//! purges past it.

use chrono::{DateTime, Utc};
use fleet_core::types::ProxyLogLine;
use fleet_core::Result;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::ProxyLogRow;
use crate::error::db_err;

pub async fn insert(
    db: impl SqliteExecutor<'_>,
    proxy_id: Uuid,
    captured_at: DateTime<Utc>,
    log_level: Option<&str>,
    message: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO proxy_logs (id, proxy_id, captured_at, log_level, message, expires_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(proxy_id)
    .bind(captured_at)
    .bind(log_level)
    .bind(message)
    .bind(expires_at)
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn list_by_proxy(db: impl SqliteExecutor<'_>, proxy_id: Uuid) -> Result<Vec<ProxyLogLine>> {
    let rows = sqlx::query_as::<_, ProxyLogRow>(
        "SELECT id, proxy_id, captured_at, log_level, message, expires_at
         FROM proxy_logs WHERE proxy_id = ?
         ORDER BY captured_at",
    )
    .bind(proxy_id)
    .fetch_all(db)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn cleanup_expired(db: impl SqliteExecutor<'_>, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM proxy_logs WHERE expires_at < ?")
        .bind(now)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(result.rows_affected())
}
