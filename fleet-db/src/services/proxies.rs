//! Fleet views and per-proxy operations for the management API.

use chrono::{DateTime, Duration, TimeZone, Utc};
use fleet_core::types::{ConfigStatus, ProxyLogLine, ProxyStat};
use fleet_core::{Error, Result};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::entities::ProxyRow;
use crate::repos::{config, config_proxy, logs, proxy, stats};
use crate::services::audit::AuditService;

/// History returned to the UI is aggregated per minute, newest first.
const HISTORY_MINUTES: usize = 60;

#[derive(Debug, Clone, Serialize)]
pub struct ProxyListItem {
    pub id: Uuid,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ProxyConfigRef>,
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<stats::StatsSummary>,
}

/// The active configuration a proxy is pinned to, with the convergence
/// flag the dashboard surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyConfigRef {
    pub id: Uuid,
    pub name: String,
    pub version: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fingerprint: String,
    pub in_sync: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyListResponse {
    pub data: Vec<ProxyListItem>,
    pub summary: FleetSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyDetail {
    #[serde(flatten)]
    pub item: ProxyListItem,
    pub stats_history: Vec<ProxyStat>,
}

#[derive(Clone)]
pub struct ProxyService {
    pool: SqlitePool,
    audit: AuditService,
}

impl ProxyService {
    pub fn new(pool: SqlitePool, audit: AuditService) -> Self {
        Self { pool, audit }
    }

    pub async fn list(&self) -> Result<ProxyListResponse> {
        let proxies = proxy::list(&self.pool).await?;
        let mut online = 0;
        let mut data = Vec::with_capacity(proxies.len());
        for row in proxies {
            if row.is_online {
                online += 1;
            }
            data.push(self.list_item(row).await?);
        }

        let total = data.len();
        Ok(ProxyListResponse {
            summary: FleetSummary {
                total,
                online,
                offline: total - online,
            },
            data,
        })
    }

    pub async fn get_detail(&self, id: Uuid) -> Result<ProxyDetail> {
        let row = proxy::get_by_id(&self.pool, id).await?;
        let item = self.list_item(row).await?;

        let since = Utc::now() - Duration::hours(1);
        let samples = stats::list_since(&self.pool, id, since, 4 * HISTORY_MINUTES as i64).await?;
        let stats_history = aggregate_per_minute(samples);

        Ok(ProxyDetail {
            item,
            stats_history,
        })
    }

    /// Open a log-capture window on the proxy; the agent picks the flag
    /// up on its next poll.
    pub async fn start_log_capture(
        &self,
        id: Uuid,
        duration_minutes: i64,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        if !(1..=5).contains(&duration_minutes) {
            return Err(Error::BadRequest(
                "duration must be between 1 and 5 minutes".to_string(),
            ));
        }

        proxy::get_by_id(&self.pool, id).await?;
        let until = Utc::now() + Duration::minutes(duration_minutes);
        proxy::set_capture_until(&self.pool, id, until).await?;

        self.audit
            .record(
                Some(user_id),
                "proxy.capture_logs",
                "proxy",
                Some(id),
                None,
                Some(json!({ "until": until })),
                ip,
            )
            .await;

        Ok(until)
    }

    pub async fn get_logs(&self, id: Uuid) -> Result<Vec<ProxyLogLine>> {
        proxy::get_by_id(&self.pool, id).await?;
        logs::list_by_proxy(&self.pool, id).await
    }

    /// Assign (or with `None`, unassign) a configuration. Only active
    /// configurations are assignable.
    pub async fn assign_config(
        &self,
        proxy_id: Uuid,
        config_id: Option<Uuid>,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<()> {
        let row = proxy::get_by_id(&self.pool, proxy_id).await?;

        if let Some(config_id) = config_id {
            let cfg = config::get_by_id(&self.pool, config_id).await?;
            if cfg.status != ConfigStatus::Active {
                return Err(Error::BadRequest(
                    "config must be active to assign".to_string(),
                ));
            }
        }

        config_proxy::delete_by_proxy(&self.pool, proxy_id).await?;
        if let Some(config_id) = config_id {
            config_proxy::assign(&self.pool, config_id, proxy_id, user_id).await?;
        }
        proxy::set_assigned_config(&self.pool, proxy_id, config_id).await?;

        self.audit
            .record(
                Some(user_id),
                "proxy.assign_config",
                "proxy",
                Some(proxy_id),
                Some(json!({ "hostname": row.hostname })),
                Some(json!({ "config_id": config_id })),
                ip,
            )
            .await;

        Ok(())
    }

    pub async fn delete(&self, id: Uuid, user_id: Uuid, ip: Option<&str>) -> Result<()> {
        let row = proxy::get_by_id(&self.pool, id).await?;
        proxy::delete(&self.pool, id).await?;

        self.audit
            .record(
                Some(user_id),
                "proxy.delete",
                "proxy",
                Some(id),
                Some(json!({ "hostname": row.hostname })),
                None,
                ip,
            )
            .await;

        Ok(())
    }

    async fn list_item(&self, row: ProxyRow) -> Result<ProxyListItem> {
        let config = match config::get_active_for_hostname(&self.pool, &row.hostname).await? {
            Some(cfg) => {
                let fingerprint = cfg.fingerprint.unwrap_or_default();
                let in_sync = !fingerprint.is_empty()
                    && row.observed_fingerprint.as_deref() == Some(fingerprint.as_str());
                Some(ProxyConfigRef {
                    id: cfg.id,
                    name: cfg.name,
                    version: cfg.version,
                    fingerprint,
                    in_sync,
                })
            }
            None => None,
        };

        let since = Utc::now() - Duration::hours(1);
        let summary = stats::summary_for_proxy(&self.pool, row.id, since).await.ok();

        Ok(ProxyListItem {
            id: row.id,
            hostname: row.hostname,
            config,
            is_online: row.is_online,
            last_seen: row.last_seen,
            registered_at: row.registered_at,
            observed_fingerprint: row.observed_fingerprint,
            stats: summary,
        })
    }
}

/// Collapse raw samples into per-minute buckets: counters are summed,
/// the connection gauge takes the bucket maximum. Input and output are
/// both newest-first.
fn aggregate_per_minute(samples: Vec<ProxyStat>) -> Vec<ProxyStat> {
    let mut buckets: Vec<ProxyStat> = Vec::new();
    for sample in samples {
        let minute = sample.collected_at.timestamp().div_euclid(60);
        let bucket_start = Utc
            .timestamp_opt(minute * 60, 0)
            .single()
            .unwrap_or(sample.collected_at);

        match buckets.last_mut() {
            Some(last) if last.collected_at == bucket_start => {
                let m = &mut last.metrics;
                m.active_connections = m.active_connections.max(sample.metrics.active_connections);
                m.total_connections += sample.metrics.total_connections;
                m.cache_hits += sample.metrics.cache_hits;
                m.cache_misses += sample.metrics.cache_misses;
                m.errors += sample.metrics.errors;
                m.total_requests += sample.metrics.total_requests;
                m.connect_requests += sample.metrics.connect_requests;
                m.responses_2xx += sample.metrics.responses_2xx;
                m.responses_3xx += sample.metrics.responses_3xx;
                m.responses_4xx += sample.metrics.responses_4xx;
                m.responses_5xx += sample.metrics.responses_5xx;
                m.err_connect_fail += sample.metrics.err_connect_fail;
                m.err_client_abort += sample.metrics.err_client_abort;
                m.broken_server_conns += sample.metrics.broken_server_conns;
                m.bytes_in += sample.metrics.bytes_in;
                m.bytes_out += sample.metrics.bytes_out;
            }
            _ => {
                if buckets.len() == HISTORY_MINUTES {
                    break;
                }
                buckets.push(ProxyStat {
                    collected_at: bucket_start,
                    ..sample
                });
            }
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::types::ProxyMetrics;

    fn sample(secs: i64, active: i64, requests: i64) -> ProxyStat {
        ProxyStat {
            id: Uuid::new_v4(),
            proxy_id: Uuid::nil(),
            collected_at: Utc.timestamp_opt(secs, 0).single().unwrap(),
            metrics: ProxyMetrics {
                active_connections: active,
                total_requests: requests,
                ..Default::default()
            },
        }
    }

    #[test]
    fn sums_counters_and_maxes_the_gauge_per_minute() {
        // Two samples in the same minute, one in the previous.
        let aggregated = aggregate_per_minute(vec![
            sample(120, 7, 10),
            sample(90, 3, 5),
            sample(60, 9, 5),
            sample(30, 2, 1),
        ]);

        assert_eq!(aggregated.len(), 3);
        assert_eq!(aggregated[0].collected_at.timestamp(), 120);
        assert_eq!(aggregated[1].collected_at.timestamp(), 60);
        assert_eq!(aggregated[1].metrics.total_requests, 10);
        assert_eq!(aggregated[1].metrics.active_connections, 9);
        assert_eq!(aggregated[2].collected_at.timestamp(), 0);
    }

    #[test]
    fn empty_input_aggregates_to_nothing() {
        assert!(aggregate_per_minute(Vec::new()).is_empty());
    }
}
