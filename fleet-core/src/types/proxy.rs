//! Fleet registry types: agent instances, counter samples, captured logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered proxy (one sidecar agent instance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: Uuid,
    /// Globally unique across the fleet.
    pub hostname: String,
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Last fingerprint the agent acknowledged applying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_fingerprint: Option<String>,
    pub registered_at: DateTime<Utc>,
    /// Source address of the last registration, used for the identity
    /// check when a second agent claims the same hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_ip: Option<String>,
    /// End of the current log-capture window, if one is open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_logs_until: Option<DateTime<Utc>>,
}

/// Raw counter snapshot pushed by an agent.
///
/// All fields are monotonically non-decreasing within a proxy process
/// lifetime, except `active_connections` which is a gauge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyMetrics {
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

/// A stored counter sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyStat {
    pub id: Uuid,
    pub proxy_id: Uuid,
    pub collected_at: DateTime<Utc>,
    #[serde(flatten)]
    pub metrics: ProxyMetrics,
}

/// One captured diagnostic line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyLogLine {
    pub id: Uuid,
    pub proxy_id: Uuid,
    pub captured_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub expires_at: DateTime<Utc>,
}
