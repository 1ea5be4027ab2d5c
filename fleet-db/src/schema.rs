//! Embedded schema. `init_schema` is idempotent and safe to run on
//! every startup; `fleetctl init` and the test helpers call it.

use fleet_core::Result;
use sqlx::SqlitePool;

use crate::error::db_err;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            BLOB PRIMARY KEY,
        username      TEXT NOT NULL UNIQUE,
        email         TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role          TEXT NOT NULL,
        is_active     INTEGER NOT NULL DEFAULT 1,
        created_at    TEXT NOT NULL,
        updated_at    TEXT NOT NULL,
        last_login    TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id                 BLOB PRIMARY KEY,
        user_id            BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        token_hash         TEXT NOT NULL,
        refresh_token_hash TEXT,
        ip_address         TEXT,
        last_beacon        TEXT NOT NULL,
        expires_at         TEXT NOT NULL,
        created_at         TEXT NOT NULL,
        revoked_at         TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS configs (
        id             BLOB PRIMARY KEY,
        name           TEXT NOT NULL,
        description    TEXT,
        status         TEXT NOT NULL DEFAULT 'draft',
        version        INTEGER NOT NULL DEFAULT 1,
        default_action TEXT NOT NULL DEFAULT 'direct',
        fingerprint    TEXT,
        created_by     BLOB,
        created_at     TEXT NOT NULL,
        modified_by    BLOB,
        modified_at    TEXT NOT NULL,
        submitted_by   BLOB,
        submitted_at   TEXT,
        approved_by    BLOB,
        approved_at    TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS domain_rules (
        id         BLOB PRIMARY KEY,
        config_id  BLOB NOT NULL REFERENCES configs(id) ON DELETE CASCADE,
        domain     TEXT NOT NULL,
        action     TEXT NOT NULL,
        priority   INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (config_id, domain)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ip_range_rules (
        id         BLOB PRIMARY KEY,
        config_id  BLOB NOT NULL REFERENCES configs(id) ON DELETE CASCADE,
        cidr       TEXT NOT NULL,
        action     TEXT NOT NULL,
        priority   INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (config_id, cidr)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS client_acl_rules (
        id         BLOB PRIMARY KEY,
        config_id  BLOB NOT NULL REFERENCES configs(id) ON DELETE CASCADE,
        cidr       TEXT NOT NULL,
        action     TEXT NOT NULL,
        priority   INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (config_id, cidr)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS parent_proxies (
        id         BLOB PRIMARY KEY,
        config_id  BLOB NOT NULL REFERENCES configs(id) ON DELETE CASCADE,
        address    TEXT NOT NULL,
        port       INTEGER NOT NULL,
        priority   INTEGER NOT NULL DEFAULT 0,
        enabled    INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS proxies (
        id                   BLOB PRIMARY KEY,
        hostname             TEXT NOT NULL UNIQUE,
        config_id            BLOB REFERENCES configs(id) ON DELETE SET NULL,
        is_online            INTEGER NOT NULL DEFAULT 0,
        last_seen            TEXT,
        observed_fingerprint TEXT,
        registered_at        TEXT NOT NULL,
        registered_ip        TEXT,
        capture_logs_until   TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS config_proxies (
        config_id   BLOB NOT NULL REFERENCES configs(id) ON DELETE CASCADE,
        proxy_id    BLOB NOT NULL REFERENCES proxies(id) ON DELETE CASCADE,
        assigned_at TEXT NOT NULL,
        assigned_by BLOB,
        PRIMARY KEY (config_id, proxy_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS proxy_stats (
        id                  BLOB PRIMARY KEY,
        proxy_id            BLOB NOT NULL REFERENCES proxies(id) ON DELETE CASCADE,
        collected_at        TEXT NOT NULL,
        active_connections  INTEGER NOT NULL DEFAULT 0,
        total_connections   INTEGER NOT NULL DEFAULT 0,
        cache_hits          INTEGER NOT NULL DEFAULT 0,
        cache_misses        INTEGER NOT NULL DEFAULT 0,
        errors              INTEGER NOT NULL DEFAULT 0,
        total_requests      INTEGER NOT NULL DEFAULT 0,
        connect_requests    INTEGER NOT NULL DEFAULT 0,
        responses_2xx       INTEGER NOT NULL DEFAULT 0,
        responses_3xx       INTEGER NOT NULL DEFAULT 0,
        responses_4xx       INTEGER NOT NULL DEFAULT 0,
        responses_5xx       INTEGER NOT NULL DEFAULT 0,
        err_connect_fail    INTEGER NOT NULL DEFAULT 0,
        err_client_abort    INTEGER NOT NULL DEFAULT 0,
        broken_server_conns INTEGER NOT NULL DEFAULT 0,
        bytes_in            INTEGER NOT NULL DEFAULT 0,
        bytes_out           INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS proxy_logs (
        id          BLOB PRIMARY KEY,
        proxy_id    BLOB NOT NULL REFERENCES proxies(id) ON DELETE CASCADE,
        captured_at TEXT NOT NULL,
        log_level   TEXT,
        message     TEXT,
        expires_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_logs (
        id          BLOB PRIMARY KEY,
        user_id     BLOB,
        action      TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id   BLOB,
        old_value   TEXT,
        new_value   TEXT,
        ip_address  TEXT,
        created_at  TEXT NOT NULL
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_proxy_stats_proxy_time ON proxy_stats (proxy_id, collected_at)",
    "CREATE INDEX IF NOT EXISTS idx_proxy_logs_proxy ON proxy_logs (proxy_id, captured_at)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_token ON sessions (token_hash)",
    "CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_logs (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_configs_status ON configs (status)",
];

/// Create all tables and indexes.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for ddl in TABLES.iter().chain(INDEXES) {
        sqlx::query(ddl).execute(pool).await.map_err(db_err)?;
    }
    Ok(())
}
