use chrono::{DateTime, Utc};
use fleet_core::types::{Config, ConfigStatus, RuleAction};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConfigRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub version: i64,
    pub default_action: String,
    pub fingerprint: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<Uuid>,
    pub modified_at: DateTime<Utc>,
    pub submitted_by: Option<Uuid>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    /// Joined aggregate; 0 outside list queries.
    #[sqlx(default)]
    pub proxy_count: i64,
}

impl From<ConfigRow> for Config {
    fn from(row: ConfigRow) -> Self {
        Config {
            id: row.id,
            name: row.name,
            description: row.description,
            status: ConfigStatus::parse(&row.status).unwrap_or(ConfigStatus::Draft),
            version: row.version,
            default_action: RuleAction::parse(&row.default_action).unwrap_or(RuleAction::Direct),
            fingerprint: row.fingerprint,
            created_by: row.created_by,
            created_at: row.created_at,
            modified_by: row.modified_by,
            modified_at: row.modified_at,
            submitted_by: row.submitted_by,
            submitted_at: row.submitted_at,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            proxy_count: row.proxy_count,
        }
    }
}
