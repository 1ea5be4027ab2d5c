use chrono::{DateTime, Utc};
use fleet_core::types::{
    AclAction, ClientAclRule, DomainRule, IpRangeRule, ParentProxy, RuleAction,
};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DomainRuleRow {
    pub id: Uuid,
    pub config_id: Uuid,
    pub domain: String,
    pub action: String,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

impl From<DomainRuleRow> for DomainRule {
    fn from(row: DomainRuleRow) -> Self {
        DomainRule {
            id: row.id,
            config_id: row.config_id,
            domain: row.domain,
            action: RuleAction::parse(&row.action).unwrap_or(RuleAction::Direct),
            priority: row.priority,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IpRangeRuleRow {
    pub id: Uuid,
    pub config_id: Uuid,
    pub cidr: String,
    pub action: String,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

impl From<IpRangeRuleRow> for IpRangeRule {
    fn from(row: IpRangeRuleRow) -> Self {
        IpRangeRule {
            id: row.id,
            config_id: row.config_id,
            cidr: row.cidr,
            action: RuleAction::parse(&row.action).unwrap_or(RuleAction::Direct),
            priority: row.priority,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClientAclRuleRow {
    pub id: Uuid,
    pub config_id: Uuid,
    pub cidr: String,
    pub action: String,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

impl From<ClientAclRuleRow> for ClientAclRule {
    fn from(row: ClientAclRuleRow) -> Self {
        ClientAclRule {
            id: row.id,
            config_id: row.config_id,
            cidr: row.cidr,
            action: AclAction::parse(&row.action).unwrap_or(AclAction::Deny),
            priority: row.priority,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParentProxyRow {
    pub id: Uuid,
    pub config_id: Uuid,
    pub address: String,
    pub port: i64,
    pub priority: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ParentProxyRow> for ParentProxy {
    fn from(row: ParentProxyRow) -> Self {
        ParentProxy {
            id: row.id,
            config_id: row.config_id,
            address: row.address,
            port: row.port,
            priority: row.priority,
            enabled: row.enabled,
            created_at: row.created_at,
        }
    }
}
