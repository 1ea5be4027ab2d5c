//! Domain types for the fleet control plane.

pub mod audit;
pub mod config;
pub mod input;
pub mod proxy;
pub mod user;

pub use audit::AuditLog;
pub use config::{
    AclAction, ClientAclRule, Config, ConfigStatus, DomainRule, IpRangeRule, ParentProxy,
    RuleAction,
};
pub use input::{ClientAclInput, ConfigInput, DomainRuleInput, IpRangeInput, ParentProxyInput};
pub use proxy::{Proxy, ProxyLogLine, ProxyMetrics, ProxyStat};
pub use user::{User, UserRole};
