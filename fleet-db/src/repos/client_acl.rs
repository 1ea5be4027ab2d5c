use chrono::Utc;
use fleet_core::types::{AclAction, ClientAclRule};
use fleet_core::Result;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::ClientAclRuleRow;
use crate::error::db_err;

pub async fn list_by_config(
    db: impl SqliteExecutor<'_>,
    config_id: Uuid,
) -> Result<Vec<ClientAclRule>> {
    let rows = sqlx::query_as::<_, ClientAclRuleRow>(
        "SELECT id, config_id, cidr, action, priority, created_at
         FROM client_acl_rules WHERE config_id = ?
         ORDER BY priority, cidr",
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
    cidr: &str,
    action: AclAction,
    priority: i64,
) -> Result<ClientAclRule> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO client_acl_rules (id, config_id, cidr, action, priority, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(config_id)
    .bind(cidr)
    .bind(action.as_str())
    .bind(priority)
    .bind(now)
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(ClientAclRule {
        id,
        config_id,
        cidr: cidr.to_string(),
        action,
        priority,
        created_at: now,
    })
}

pub async fn delete_by_config(db: impl SqliteExecutor<'_>, config_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM client_acl_rules WHERE config_id = ?")
        .bind(config_id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}
