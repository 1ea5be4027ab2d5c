//! Append-only audit rows with filtered listing.

use chrono::{DateTime, Utc};
use fleet_core::types::AuditLog;
use fleet_core::Result;
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};
use uuid::Uuid;

use crate::entities::AuditLogRow;
use crate::error::db_err;

pub struct NewAuditLog<'a> {
    pub user_id: Option<Uuid>,
    pub action: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Option<Uuid>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub ip_address: Option<&'a str>,
}

pub async fn insert(db: impl SqliteExecutor<'_>, entry: NewAuditLog<'_>) -> Result<()> {
    sqlx::query(
        "INSERT INTO audit_logs (id, user_id, action, entity_type, entity_id,
                                 old_value, new_value, ip_address, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.old_value.map(|v| v.to_string()))
    .bind(entry.new_value.map(|v| v.to_string()))
    .bind(entry.ip_address)
    .bind(Utc::now())
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn list(
    db: impl SqliteExecutor<'_>,
    filter: &AuditFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditLog>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, user_id, action, entity_type, entity_id, old_value, new_value,
                ip_address, created_at
         FROM audit_logs WHERE 1 = 1",
    );
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC LIMIT ");
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows: Vec<AuditLogRow> = qb
        .build_query_as()
        .fetch_all(db)
        .await
        .map_err(db_err)?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn count(db: impl SqliteExecutor<'_>, filter: &AuditFilter) -> Result<i64> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM audit_logs WHERE 1 = 1");
    push_filters(&mut qb, filter);

    qb.build_query_scalar().fetch_one(db).await.map_err(db_err)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AuditFilter) {
    if let Some(entity_type) = &filter.entity_type {
        qb.push(" AND entity_type = ");
        qb.push_bind(entity_type.clone());
    }
    if let Some(entity_id) = filter.entity_id {
        qb.push(" AND entity_id = ");
        qb.push_bind(entity_id);
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ");
        qb.push_bind(user_id);
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at <= ");
        qb.push_bind(to);
    }
}
