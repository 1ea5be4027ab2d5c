use chrono::Utc;
use fleet_core::types::{IpRangeRule, RuleAction};
use fleet_core::Result;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::IpRangeRuleRow;
use crate::error::db_err;

pub async fn list_by_config(db: impl SqliteExecutor<'_>, config_id: Uuid) -> Result<Vec<IpRangeRule>> {
    let rows = sqlx::query_as::<_, IpRangeRuleRow>(
        "SELECT id, config_id, cidr, action, priority, created_at
         FROM ip_range_rules WHERE config_id = ?
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
    action: RuleAction,
    priority: i64,
) -> Result<IpRangeRule> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO ip_range_rules (id, config_id, cidr, action, priority, created_at)
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
    Ok(IpRangeRule {
        id,
        config_id,
        cidr: cidr.to_string(),
        action,
        priority,
        created_at: now,
    })
}

pub async fn delete_by_config(db: impl SqliteExecutor<'_>, config_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM ip_range_rules WHERE config_id = ?")
        .bind(config_id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}
