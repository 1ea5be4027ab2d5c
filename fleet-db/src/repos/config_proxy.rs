//! The configuration ↔ proxy assignment through-table.

use chrono::Utc;
use fleet_core::Result;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::ProxyRow;
use crate::error::db_err;

pub async fn assign(
    db: impl SqliteExecutor<'_>,
    config_id: Uuid,
    proxy_id: Uuid,
    assigned_by: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO config_proxies (config_id, proxy_id, assigned_at, assigned_by)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (config_id, proxy_id) DO NOTHING",
    )
    .bind(config_id)
    .bind(proxy_id)
    .bind(Utc::now())
    .bind(assigned_by)
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn list_proxies_by_config(
    db: impl SqliteExecutor<'_>,
    config_id: Uuid,
) -> Result<Vec<ProxyRow>> {
    sqlx::query_as::<_, ProxyRow>(
        "SELECT p.id, p.hostname, p.config_id, p.is_online, p.last_seen, p.observed_fingerprint,
                p.registered_at, p.registered_ip, p.capture_logs_until
         FROM proxies p
         JOIN config_proxies cp ON cp.proxy_id = p.id
         WHERE cp.config_id = ?
         ORDER BY p.hostname",
    )
    .bind(config_id)
    .fetch_all(db)
    .await
    .map_err(db_err)
}

pub async fn delete_by_config(db: impl SqliteExecutor<'_>, config_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM config_proxies WHERE config_id = ?")
        .bind(config_id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn delete_by_proxy(db: impl SqliteExecutor<'_>, proxy_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM config_proxies WHERE proxy_id = ?")
        .bind(proxy_id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}
