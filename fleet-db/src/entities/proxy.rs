use chrono::{DateTime, Utc};
use fleet_core::types::{Proxy, ProxyLogLine, ProxyMetrics, ProxyStat};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProxyRow {
    pub id: Uuid,
    pub hostname: String,
    pub config_id: Option<Uuid>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub observed_fingerprint: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub registered_ip: Option<String>,
    pub capture_logs_until: Option<DateTime<Utc>>,
}

impl From<ProxyRow> for Proxy {
    fn from(row: ProxyRow) -> Self {
        Proxy {
            id: row.id,
            hostname: row.hostname,
            is_online: row.is_online,
            last_seen: row.last_seen,
            observed_fingerprint: row.observed_fingerprint,
            registered_at: row.registered_at,
            registered_ip: row.registered_ip,
            capture_logs_until: row.capture_logs_until,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProxyStatRow {
    pub id: Uuid,
    pub proxy_id: Uuid,
    pub collected_at: DateTime<Utc>,
    pub active_connections: i64,
    pub total_connections: i64,
    pub cache_hits: i64,
    pub cache_misses: i64,
    pub errors: i64,
    pub total_requests: i64,
    pub connect_requests: i64,
    pub responses_2xx: i64,
    pub responses_3xx: i64,
    pub responses_4xx: i64,
    pub responses_5xx: i64,
    pub err_connect_fail: i64,
    pub err_client_abort: i64,
    pub broken_server_conns: i64,
    pub bytes_in: i64,
    pub bytes_out: i64,
}

impl From<ProxyStatRow> for ProxyStat {
    fn from(row: ProxyStatRow) -> Self {
        ProxyStat {
            id: row.id,
            proxy_id: row.proxy_id,
            collected_at: row.collected_at,
            metrics: ProxyMetrics {
                active_connections: row.active_connections,
                total_connections: row.total_connections,
                cache_hits: row.cache_hits,
                cache_misses: row.cache_misses,
                errors: row.errors,
                total_requests: row.total_requests,
                connect_requests: row.connect_requests,
                responses_2xx: row.responses_2xx,
                responses_3xx: row.responses_3xx,
                responses_4xx: row.responses_4xx,
                responses_5xx: row.responses_5xx,
                err_connect_fail: row.err_connect_fail,
                err_client_abort: row.err_client_abort,
                broken_server_conns: row.broken_server_conns,
                bytes_in: row.bytes_in,
                bytes_out: row.bytes_out,
            },
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProxyLogRow {
    pub id: Uuid,
    pub proxy_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub log_level: Option<String>,
    pub message: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<ProxyLogRow> for ProxyLogLine {
    fn from(row: ProxyLogRow) -> Self {
        ProxyLogLine {
            id: row.id,
            proxy_id: row.proxy_id,
            captured_at: row.captured_at,
            log_level: row.log_level,
            message: row.message,
            expires_at: row.expires_at,
        }
    }
}
