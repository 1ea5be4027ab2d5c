//! Counter samples. Stored at push granularity, summarized and
//! aggregated for the UI.

use chrono::{DateTime, Utc};
use fleet_core::types::{ProxyMetrics, ProxyStat};
use fleet_core::Result;
use serde::Serialize;
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::ProxyStatRow;
use crate::error::db_err;

pub async fn insert(
    db: impl SqliteExecutor<'_>,
    proxy_id: Uuid,
    collected_at: DateTime<Utc>,
    m: &ProxyMetrics,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO proxy_stats (
            id, proxy_id, collected_at,
            active_connections, total_connections, cache_hits, cache_misses, errors,
            total_requests, connect_requests, responses_2xx, responses_3xx, responses_4xx,
            responses_5xx, err_connect_fail, err_client_abort, broken_server_conns,
            bytes_in, bytes_out
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(proxy_id)
    .bind(collected_at)
    .bind(m.active_connections)
    .bind(m.total_connections)
    .bind(m.cache_hits)
    .bind(m.cache_misses)
    .bind(m.errors)
    .bind(m.total_requests)
    .bind(m.connect_requests)
    .bind(m.responses_2xx)
    .bind(m.responses_3xx)
    .bind(m.responses_4xx)
    .bind(m.responses_5xx)
    .bind(m.err_connect_fail)
    .bind(m.err_client_abort)
    .bind(m.broken_server_conns)
    .bind(m.bytes_in)
    .bind(m.bytes_out)
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Samples newer than the cutoff, newest first.
pub async fn list_since(
    db: impl SqliteExecutor<'_>,
    proxy_id: Uuid,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ProxyStat>> {
    let rows = sqlx::query_as::<_, ProxyStatRow>(
        "SELECT * FROM proxy_stats
         WHERE proxy_id = ? AND collected_at > ?
         ORDER BY collected_at DESC LIMIT ?",
    )
    .bind(proxy_id)
    .bind(since)
    .bind(limit)
    .fetch_all(db)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Rolling 1-hour summary shown on the fleet dashboard.
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct StatsSummary {
    pub active_connections: i64,
    pub total_connections_1h: i64,
    #[sqlx(skip)]
    pub cache_hit_rate: f64,
    #[serde(skip)]
    pub cache_hits: i64,
    #[serde(skip)]
    pub cache_misses: i64,
    pub total_requests_1h: i64,
    pub errors_1h: i64,
    pub responses_2xx_1h: i64,
    pub responses_4xx_1h: i64,
    pub responses_5xx_1h: i64,
    pub bytes_in_1h: i64,
    pub bytes_out_1h: i64,
}

pub async fn summary_for_proxy(
    db: impl SqliteExecutor<'_>,
    proxy_id: Uuid,
    since: DateTime<Utc>,
) -> Result<StatsSummary> {
    let mut summary = sqlx::query_as::<_, StatsSummary>(
        "SELECT
           COALESCE((SELECT active_connections FROM proxy_stats
                     WHERE proxy_id = ? ORDER BY collected_at DESC LIMIT 1), 0) AS active_connections,
           COALESCE(SUM(total_connections), 0) AS total_connections_1h,
           COALESCE(SUM(cache_hits), 0)        AS cache_hits,
           COALESCE(SUM(cache_misses), 0)      AS cache_misses,
           COALESCE(SUM(total_requests), 0)    AS total_requests_1h,
           COALESCE(SUM(errors), 0)            AS errors_1h,
           COALESCE(SUM(responses_2xx), 0)     AS responses_2xx_1h,
           COALESCE(SUM(responses_4xx), 0)     AS responses_4xx_1h,
           COALESCE(SUM(responses_5xx), 0)     AS responses_5xx_1h,
           COALESCE(SUM(bytes_in), 0)          AS bytes_in_1h,
           COALESCE(SUM(bytes_out), 0)         AS bytes_out_1h
         FROM proxy_stats
         WHERE proxy_id = ? AND collected_at > ?",
    )
    .bind(proxy_id)
    .bind(proxy_id)
    .bind(since)
    .fetch_one(db)
    .await
    .map_err(db_err)?;

    let lookups = summary.cache_hits + summary.cache_misses;
    if lookups > 0 {
        summary.cache_hit_rate = summary.cache_hits as f64 / lookups as f64;
    }
    Ok(summary)
}

pub async fn cleanup_old(db: impl SqliteExecutor<'_>, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM proxy_stats WHERE collected_at < ?")
        .bind(cutoff)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(result.rows_affected())
}
