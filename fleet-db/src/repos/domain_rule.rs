use chrono::Utc;
use fleet_core::types::{DomainRule, RuleAction};
use fleet_core::Result;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::DomainRuleRow;
use crate::error::db_err;

pub async fn list_by_config(db: impl SqliteExecutor<'_>, config_id: Uuid) -> Result<Vec<DomainRule>> {
    let rows = sqlx::query_as::<_, DomainRuleRow>(
        "SELECT id, config_id, domain, action, priority, created_at
         FROM domain_rules WHERE config_id = ?
         ORDER BY priority, domain",
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
    domain: &str,
    action: RuleAction,
    priority: i64,
) -> Result<DomainRule> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO domain_rules (id, config_id, domain, action, priority, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(config_id)
    .bind(domain)
    .bind(action.as_str())
    .bind(priority)
    .bind(now)
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(DomainRule {
        id,
        config_id,
        domain: domain.to_string(),
        action,
        priority,
        created_at: now,
    })
}

pub async fn delete_by_config(db: impl SqliteExecutor<'_>, config_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM domain_rules WHERE config_id = ?")
        .bind(config_id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}
