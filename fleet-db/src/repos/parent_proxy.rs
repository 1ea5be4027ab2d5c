use chrono::Utc;
use fleet_core::types::ParentProxy;
use fleet_core::Result;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::ParentProxyRow;
use crate::error::db_err;

pub async fn list_by_config(db: impl SqliteExecutor<'_>, config_id: Uuid) -> Result<Vec<ParentProxy>> {
    let rows = sqlx::query_as::<_, ParentProxyRow>(
        "SELECT id, config_id, address, port, priority, enabled, created_at
         FROM parent_proxies WHERE config_id = ?
         ORDER BY priority, address, port",
    )
    .bind(config_id)
    .fetch_all(db)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn insert(
    db: impl SqliteExecutor<'_>,
    config_id: Uuid,
    address: &str,
    port: i64,
    priority: i64,
    enabled: bool,
) -> Result<ParentProxy> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO parent_proxies (id, config_id, address, port, priority, enabled, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(config_id)
    .bind(address)
    .bind(port)
    .bind(priority)
    .bind(enabled)
    .bind(now)
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(ParentProxy {
        id,
        config_id,
        address: address.to_string(),
        port,
        priority,
        enabled,
        created_at: now,
    })
}

pub async fn delete_by_config(db: impl SqliteExecutor<'_>, config_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM parent_proxies WHERE config_id = ?")
        .bind(config_id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}
