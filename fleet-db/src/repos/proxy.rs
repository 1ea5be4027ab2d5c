//! Fleet registry rows.

use chrono::{DateTime, Utc};
use fleet_core::{Error, Result};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::ProxyRow;
use crate::error::db_err;

const COLUMNS: &str = "id, hostname, config_id, is_online, last_seen, observed_fingerprint, \
     registered_at, registered_ip, capture_logs_until";

pub async fn get_by_id(db: impl SqliteExecutor<'_>, id: Uuid) -> Result<ProxyRow> {
    sqlx::query_as::<_, ProxyRow>(&format!("SELECT {COLUMNS} FROM proxies WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
        .map_err(db_err)?
        .ok_or_else(|| Error::NotFound(format!("proxy {id} not found")))
}

pub async fn get_by_hostname(
    db: impl SqliteExecutor<'_>,
    hostname: &str,
) -> Result<Option<ProxyRow>> {
    sqlx::query_as::<_, ProxyRow>(&format!("SELECT {COLUMNS} FROM proxies WHERE hostname = ?"))
        .bind(hostname)
        .fetch_optional(db)
        .await
        .map_err(db_err)
}

pub async fn list(db: impl SqliteExecutor<'_>) -> Result<Vec<ProxyRow>> {
    sqlx::query_as::<_, ProxyRow>(&format!("SELECT {COLUMNS} FROM proxies ORDER BY hostname"))
        .fetch_all(db)
        .await
        .map_err(db_err)
}

pub async fn insert(
    db: impl SqliteExecutor<'_>,
    hostname: &str,
    config_id: Option<Uuid>,
    registered_ip: &str,
) -> Result<ProxyRow> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO proxies (id, hostname, config_id, is_online, last_seen, registered_at, registered_ip)
         VALUES (?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(id)
    .bind(hostname)
    .bind(config_id)
    .bind(now)
    .bind(now)
    .bind(registered_ip)
    .execute(db)
    .await
    .map_err(db_err)?;

    Ok(ProxyRow {
        id,
        hostname: hostname.to_string(),
        config_id,
        is_online: true,
        last_seen: Some(now),
        observed_fingerprint: None,
        registered_at: now,
        registered_ip: Some(registered_ip.to_string()),
        capture_logs_until: None,
    })
}

pub async fn update_registered_ip(db: impl SqliteExecutor<'_>, id: Uuid, ip: &str) -> Result<()> {
    sqlx::query("UPDATE proxies SET registered_ip = ? WHERE id = ?")
        .bind(ip)
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Every contact from an agent refreshes liveness.
pub async fn touch_last_seen(db: impl SqliteExecutor<'_>, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE proxies SET last_seen = ?, is_online = 1 WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn update_observed_fingerprint(
    db: impl SqliteExecutor<'_>,
    id: Uuid,
    fingerprint: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE proxies SET observed_fingerprint = ?, last_seen = ?, is_online = 1 WHERE id = ?",
    )
    .bind(fingerprint)
    .bind(Utc::now())
    .bind(id)
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn set_capture_until(
    db: impl SqliteExecutor<'_>,
    id: Uuid,
    until: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE proxies SET capture_logs_until = ? WHERE id = ?")
        .bind(until)
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn set_assigned_config(
    db: impl SqliteExecutor<'_>,
    id: Uuid,
    config_id: Option<Uuid>,
) -> Result<()> {
    sqlx::query("UPDATE proxies SET config_id = ? WHERE id = ?")
        .bind(config_id)
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Flip proxies that have not been seen since the cutoff to offline.
/// Returns how many were flipped.
pub async fn mark_offline_stale(
    db: impl SqliteExecutor<'_>,
    cutoff: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE proxies SET is_online = 0 WHERE is_online = 1 AND (last_seen IS NULL OR last_seen < ?)",
    )
    .bind(cutoff)
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected())
}

pub async fn delete(db: impl SqliteExecutor<'_>, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM proxies WHERE id = ?")
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("proxy {id} not found")));
    }
    Ok(())
}
