//! Write-side input shapes for configurations.
//!
//! Actions arrive as plain strings and are parsed during validation so
//! that a bad value surfaces as a `bad_request` with a pointed message
//! instead of a deserialization failure.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of configuration create/update requests. Update applies
/// replace-all semantics to every child collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `direct` or `parent`; empty defaults to `direct`.
    #[serde(default)]
    pub default_action: String,
    #[serde(default)]
    pub domains: Vec<DomainRuleInput>,
    #[serde(default)]
    pub ip_ranges: Vec<IpRangeInput>,
    #[serde(default)]
    pub parent_proxies: Vec<ParentProxyInput>,
    #[serde(default)]
    pub client_acl: Vec<ClientAclInput>,
    #[serde(default)]
    pub proxy_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRuleInput {
    pub domain: String,
    pub action: String,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRangeInput {
    pub cidr: String,
    pub action: String,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentProxyInput {
    pub address: String,
    pub port: i64,
    #[serde(default)]
    pub priority: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAclInput {
    pub cidr: String,
    pub action: String,
    #[serde(default)]
    pub priority: i64,
}
