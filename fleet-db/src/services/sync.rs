//! The pull-based sync protocol the sidecar agents speak.
//!
//! Stateless between calls: every poll re-derives the answer from the
//! registry and the active configuration, and every contact refreshes
//! the proxy's liveness.

use chrono::{DateTime, Duration, Utc};
use fleet_core::types::ProxyMetrics;
use fleet_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::repos::{config, logs, proxy, stats};
use crate::services::configs::compile_config;

/// How long pushed log lines are retained.
fn log_ttl() -> Duration {
    Duration::hours(1)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub hostname: String,
    #[serde(default)]
    pub config_id: Option<String>,
    #[serde(default)]
    pub proxy_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub proxy_id: String,
    pub config_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub unchanged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigFiles>,
    pub capture_logs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFiles {
    pub parent_config: String,
    pub sni_yaml: String,
    #[serde(default)]
    pub ip_allow_yaml: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AckRequest {
    pub hostname: String,
    pub hash: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsRequest {
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: ProxyMetrics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsRequest {
    pub hostname: String,
    pub lines: Vec<LogLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsResponse {
    pub received: bool,
    pub continue_capture: bool,
}

#[derive(Clone)]
pub struct SyncService {
    pool: SqlitePool,
}

impl SyncService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a proxy under a fleet-unique hostname.
    ///
    /// An existing online record is only reclaimed by the same
    /// identity: a matching `proxy_id` or a matching source address.
    /// Offline records are reclaimed freely.
    pub async fn register(&self, req: RegisterRequest, remote_ip: &str) -> Result<RegisterResponse> {
        if req.hostname.is_empty() {
            return Err(Error::BadRequest("hostname is required".to_string()));
        }

        if let Some(existing) = proxy::get_by_hostname(&self.pool, &req.hostname).await? {
            if existing.is_online {
                let same_ip = existing.registered_ip.as_deref() == Some(remote_ip);
                let same_id = req
                    .proxy_id
                    .as_deref()
                    .is_some_and(|id| id == existing.id.to_string());
                if !same_ip && !same_id {
                    return Err(Error::Conflict(format!(
                        "hostname '{}' is already registered by an active proxy",
                        req.hostname
                    )));
                }
            }

            proxy::update_registered_ip(&self.pool, existing.id, remote_ip).await?;
            proxy::touch_last_seen(&self.pool, existing.id).await?;

            return Ok(RegisterResponse {
                proxy_id: existing.id.to_string(),
                config_id: existing.config_id.map(|id| id.to_string()).unwrap_or_default(),
                status: "registered".to_string(),
            });
        }

        let config_id = req
            .config_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok());
        let created = proxy::insert(&self.pool, &req.hostname, config_id, remote_ip).await?;

        Ok(RegisterResponse {
            proxy_id: created.id.to_string(),
            config_id: created.config_id.map(|id| id.to_string()).unwrap_or_default(),
            status: "registered".to_string(),
        })
    }

    /// Fingerprint-compared poll. Returns the full artifact set only on
    /// divergence; a missing stored fingerprint is computed lazily and
    /// cached onto the configuration.
    pub async fn poll(&self, hostname: &str, current_hash: &str) -> Result<ConfigResponse> {
        let prox = proxy::get_by_hostname(&self.pool, hostname)
            .await?
            .ok_or_else(|| Error::NotFound(format!("proxy '{hostname}' not found")))?;

        proxy::touch_last_seen(&self.pool, prox.id).await?;

        let now = Utc::now();
        let (capture_logs, capture_until) = match prox.capture_logs_until {
            Some(until) if until > now => (true, Some(until)),
            _ => (false, None),
        };

        let Some(cfg) = config::get_active_for_hostname(&self.pool, hostname).await? else {
            return Ok(ConfigResponse {
                unchanged: true,
                capture_logs,
                capture_until,
                ..Default::default()
            });
        };

        let stored = cfg.fingerprint.clone().unwrap_or_default();
        if !stored.is_empty() && stored == current_hash {
            return Ok(ConfigResponse {
                unchanged: true,
                capture_logs,
                capture_until,
                ..Default::default()
            });
        }

        let mut conn = self.pool.acquire().await.map_err(crate::error::db_err)?;
        let artifacts = compile_config(&mut conn, &cfg).await?;
        drop(conn);

        let hash = if stored.is_empty() {
            let computed = artifacts.fingerprint();
            config::update_fingerprint(&self.pool, cfg.id, &computed).await?;
            computed
        } else {
            stored
        };

        Ok(ConfigResponse {
            unchanged: false,
            hash: Some(hash),
            config: Some(ConfigFiles {
                parent_config: artifacts.parent_config,
                sni_yaml: artifacts.sni_yaml,
                ip_allow_yaml: artifacts.ip_allow_yaml,
            }),
            capture_logs,
            capture_until,
        })
    }

    /// Record an apply outcome. Only a success moves the proxy's
    /// observed fingerprint; failures are logged and the divergence is
    /// retried on the next poll.
    pub async fn ack(&self, req: AckRequest) -> Result<()> {
        let prox = proxy::get_by_hostname(&self.pool, &req.hostname)
            .await?
            .ok_or_else(|| Error::NotFound(format!("proxy '{}' not found", req.hostname)))?;

        if req.status == "ok" {
            proxy::update_observed_fingerprint(&self.pool, prox.id, &req.hash).await?;
        } else {
            tracing::warn!(
                hostname = %req.hostname,
                hash = %req.hash,
                message = req.message.as_deref().unwrap_or(""),
                "agent reported config apply failure"
            );
        }
        Ok(())
    }

    pub async fn push_stats(&self, req: StatsRequest) -> Result<()> {
        let prox = proxy::get_by_hostname(&self.pool, &req.hostname)
            .await?
            .ok_or_else(|| Error::NotFound(format!("proxy '{}' not found", req.hostname)))?;

        proxy::touch_last_seen(&self.pool, prox.id).await?;
        stats::insert(&self.pool, prox.id, Utc::now(), &req.metrics).await
    }

    pub async fn push_logs(&self, req: LogsRequest) -> Result<LogsResponse> {
        let prox = proxy::get_by_hostname(&self.pool, &req.hostname)
            .await?
            .ok_or_else(|| Error::NotFound(format!("proxy '{}' not found", req.hostname)))?;

        let now = Utc::now();
        let expires_at = now + log_ttl();
        for line in &req.lines {
            logs::insert(
                &self.pool,
                prox.id,
                line.timestamp,
                Some(line.level.as_str()),
                Some(line.message.as_str()),
                expires_at,
            )
            .await?;
        }

        let continue_capture = prox
            .capture_logs_until
            .is_some_and(|until| until > now);

        Ok(LogsResponse {
            received: true,
            continue_capture,
        })
    }
}
