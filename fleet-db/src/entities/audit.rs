use chrono::{DateTime, Utc};
use fleet_core::types::AuditLog;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogRow> for AuditLog {
    fn from(row: AuditLogRow) -> Self {
        AuditLog {
            id: row.id,
            user_id: row.user_id,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            old_value: row.old_value.and_then(|v| serde_json::from_str(&v).ok()),
            new_value: row.new_value.and_then(|v| serde_json::from_str(&v).ok()),
            ip_address: row.ip_address,
            created_at: row.created_at,
        }
    }
}
