//! Issued bearer sessions. Only SHA-256 hashes of tokens touch the
//! database.

use chrono::{DateTime, Utc};
use fleet_core::Result;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::SessionRow;
use crate::error::db_err;

const COLUMNS: &str = "id, user_id, token_hash, refresh_token_hash, ip_address, \
     last_beacon, expires_at, created_at, revoked_at";

pub async fn insert(
    db: impl SqliteExecutor<'_>,
    user_id: Uuid,
    token_hash: &str,
    refresh_token_hash: &str,
    ip_address: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, refresh_token_hash, ip_address,
                               last_beacon, expires_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(user_id)
    .bind(token_hash)
    .bind(refresh_token_hash)
    .bind(ip_address)
    .bind(now)
    .bind(expires_at)
    .bind(now)
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(id)
}

pub async fn get_by_refresh_hash(
    db: impl SqliteExecutor<'_>,
    refresh_token_hash: &str,
) -> Result<Option<SessionRow>> {
    sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {COLUMNS} FROM sessions
         WHERE refresh_token_hash = ? AND revoked_at IS NULL"
    ))
    .bind(refresh_token_hash)
    .fetch_optional(db)
    .await
    .map_err(db_err)
}

/// Rotate the access token on refresh.
pub async fn update_token(
    db: impl SqliteExecutor<'_>,
    id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE sessions SET token_hash = ?, expires_at = ? WHERE id = ?")
        .bind(token_hash)
        .bind(expires_at)
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn touch_beacon(db: impl SqliteExecutor<'_>, token_hash: &str) -> Result<()> {
    sqlx::query("UPDATE sessions SET last_beacon = ? WHERE token_hash = ? AND revoked_at IS NULL")
        .bind(Utc::now())
        .bind(token_hash)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn revoke(db: impl SqliteExecutor<'_>, token_hash: &str) -> Result<()> {
    sqlx::query("UPDATE sessions SET revoked_at = ? WHERE token_hash = ? AND revoked_at IS NULL")
        .bind(Utc::now())
        .bind(token_hash)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}
