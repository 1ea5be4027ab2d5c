//! Row shapes as stored in SQLite.
//!
//! Enum columns are TEXT and are parsed into the core enums at the
//! conversion seam; timestamps are written from the server clock.

mod audit;
mod config;
mod proxy;
mod rule;
mod user;

pub use audit::AuditLogRow;
pub use config::ConfigRow;
pub use proxy::{ProxyLogRow, ProxyRow, ProxyStatRow};
pub use rule::{ClientAclRuleRow, DomainRuleRow, IpRangeRuleRow, ParentProxyRow};
pub use user::{SessionRow, UserRow};
