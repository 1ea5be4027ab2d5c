//! Domain services over the repos.

pub mod audit;
pub mod auth;
pub mod configs;
pub mod janitor;
pub mod proxies;
pub mod sync;
pub mod users;

pub use audit::AuditService;
pub use auth::AuthService;
pub use configs::ConfigService;
pub use janitor::Janitor;
pub use proxies::ProxyService;
pub use sync::SyncService;
pub use users::UserService;
