//! Configuration aggregate: the versioned rule container and its child rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a configuration.
///
/// `Approved` is the parking state of a configuration that was active
/// and has been displaced by the activation of another configuration
/// sharing at least one proxy. It is inactive but keeps its approval
/// stamps, so it can never be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    Draft,
    PendingApproval,
    Approved,
    Active,
}

impl ConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigStatus::Draft => "draft",
            ConfigStatus::PendingApproval => "pending_approval",
            ConfigStatus::Approved => "approved",
            ConfigStatus::Active => "active",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ConfigStatus::Draft),
            "pending_approval" => Some(ConfigStatus::PendingApproval),
            "approved" => Some(ConfigStatus::Approved),
            "active" => Some(ConfigStatus::Active),
            _ => None,
        }
    }
}

/// Routing action for domain and IP-range rules, and for the default rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Direct,
    Parent,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Direct => "direct",
            RuleAction::Parent => "parent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(RuleAction::Direct),
            "parent" => Some(RuleAction::Parent),
            _ => None,
        }
    }
}

/// Action for client ACL rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclAction {
    Allow,
    Deny,
}

impl AclAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AclAction::Allow => "allow",
            AclAction::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(AclAction::Allow),
            "deny" => Some(AclAction::Deny),
            _ => None,
        }
    }
}

/// A named, versioned bundle of routing rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ConfigStatus,
    /// Monotonic version; clones get `source.version + 1`.
    pub version: i64,
    pub default_action: RuleAction,
    /// Hex-encoded SHA-256 of the compiled artifacts. Empty until the
    /// configuration has been compiled at least once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<Uuid>,
    pub modified_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    /// Number of assigned proxies; filled by list queries.
    #[serde(default)]
    pub proxy_count: i64,
}

/// Domain routing rule. The selector is either a bare domain or a
/// `*.`-prefixed wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    pub id: Uuid,
    pub config_id: Uuid,
    pub domain: String,
    pub action: RuleAction,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

/// IP-range routing rule. The selector is an IPv4 CIDR or a bare IPv4.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRangeRule {
    pub id: Uuid,
    pub config_id: Uuid,
    pub cidr: String,
    pub action: RuleAction,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

/// Client ACL rule applied to inbound proxy clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAclRule {
    pub id: Uuid,
    pub config_id: Uuid,
    pub cidr: String,
    pub action: AclAction,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

/// Upstream proxy that parent-routed traffic is forwarded through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentProxy {
    pub id: Uuid,
    pub config_id: Uuid,
    pub address: String,
    pub port: i64,
    pub priority: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}
