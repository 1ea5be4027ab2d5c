//! Application state shared by every handler.

use fleet_db::services::{
    AuditService, AuthService, ConfigService, ProxyService, SyncService, UserService,
};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AppState {
    pub configs: ConfigService,
    pub sync: SyncService,
    pub proxies: ProxyService,
    pub auth: AuthService,
    pub users: UserService,
    pub audit: AuditService,
    pub jwt_secret: String,
    /// When set, sync endpoints require a matching `X-Sync-Secret`
    /// header. Unset leaves the sync surface open for trusted-network
    /// deployments.
    pub sync_secret: Option<String>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt_secret: String, sync_secret: Option<String>) -> Self {
        let audit = AuditService::new(pool.clone());
        Self {
            configs: ConfigService::new(pool.clone()),
            sync: SyncService::new(pool.clone()),
            proxies: ProxyService::new(pool.clone(), audit.clone()),
            auth: AuthService::new(pool.clone(), jwt_secret.clone(), audit.clone()),
            users: UserService::new(pool, audit.clone()),
            audit,
            jwt_secret,
            sync_secret,
        }
    }
}

/// Server bind configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}
