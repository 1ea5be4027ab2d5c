//! HTTP client for the control plane's sync surface.
//!
//! Two underlying clients: a short-timeout one for the health ping and
//! registration (fail fast, retried on a fixed cadence) and a
//! long-timeout one for polls and pushes.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AgentConfig;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(4);
const DATA_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

impl AgentError {
    pub fn is_status(&self, code: u16) -> bool {
        matches!(self, AgentError::Api { status, .. } if *status == code)
    }
}

pub type ClientResult<T> = Result<T, AgentError>;

// Wire types, mirroring the server's sync contracts.

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    hostname: &'a str,
    config_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterResponse {
    pub proxy_id: String,
    #[serde(default)]
    pub config_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigResponse {
    pub unchanged: bool,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub config: Option<ConfigFiles>,
    #[serde(default)]
    pub capture_logs: bool,
    #[serde(default)]
    pub capture_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFiles {
    #[serde(default)]
    pub parent_config: String,
    #[serde(default)]
    pub sni_yaml: String,
    #[serde(default)]
    pub ip_allow_yaml: String,
}

#[derive(Debug, Serialize)]
struct AckRequest<'a> {
    hostname: &'a str,
    hash: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    message: &'a str,
}

/// Counter snapshot scraped from the proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
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

#[derive(Debug, Serialize)]
struct StatsRequest<'a> {
    hostname: &'a str,
    timestamp: DateTime<Utc>,
    metrics: &'a Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct LogsRequest<'a> {
    hostname: &'a str,
    lines: &'a [LogLine],
}

#[derive(Debug, Deserialize)]
pub struct LogsResponse {
    #[serde(default)]
    pub received: bool,
    #[serde(default)]
    pub continue_capture: bool,
}

pub struct SyncClient {
    data: Client,
    control: Client,
    base_url: String,
    hostname: String,
    config_id: String,
    sync_secret: Option<String>,
    /// Issued on first registration; presented on re-registration so
    /// the server recognizes this agent across restarts and address
    /// changes.
    proxy_id: Mutex<Option<String>>,
}

impl SyncClient {
    pub fn new(cfg: &AgentConfig) -> ClientResult<Self> {
        Ok(Self {
            data: Client::builder().timeout(DATA_TIMEOUT).build()?,
            control: Client::builder().timeout(CONTROL_TIMEOUT).build()?,
            base_url: cfg.backend_url.trim_end_matches('/').to_string(),
            hostname: cfg.hostname.clone(),
            config_id: cfg.config_id.clone(),
            sync_secret: cfg.sync_secret.clone(),
            proxy_id: Mutex::new(None),
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Connectivity probe against `/health` on the short timeout.
    pub async fn hello(&self) -> ClientResult<()> {
        let url = format!("{}/api/v1/health", self.base_url);
        let response = self.with_secret(self.control.get(&url)).send().await?;
        if response.status().as_u16() >= 400 {
            return Err(AgentError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Register this proxy, carrying any previously issued id.
    pub async fn register(&self) -> ClientResult<()> {
        let proxy_id = self.proxy_id.lock().unwrap().clone();
        let request = RegisterRequest {
            hostname: &self.hostname,
            config_id: &self.config_id,
            proxy_id,
        };

        let url = format!("{}/api/v1/sync/register", self.base_url);
        let response = self
            .with_secret(self.control.post(&url))
            .json(&request)
            .send()
            .await?;
        let response = check(response).await?;
        let body: RegisterResponse = response.json().await?;

        tracing::info!(proxy_id = %body.proxy_id, "registered with backend");
        *self.proxy_id.lock().unwrap() = Some(body.proxy_id);
        Ok(())
    }

    /// Poll for the configuration, presenting the fingerprint currently
    /// on disk.
    pub async fn get_config(&self, current_hash: &str) -> ClientResult<ConfigResponse> {
        let url = format!("{}/api/v1/sync", self.base_url);
        let response = self
            .with_secret(self.data.get(&url))
            .query(&[("hostname", self.hostname.as_str()), ("hash", current_hash)])
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    pub async fn ack(&self, hash: &str, status: &str, message: &str) -> ClientResult<()> {
        let request = AckRequest {
            hostname: &self.hostname,
            hash,
            status,
            message,
        };
        let url = format!("{}/api/v1/sync/ack", self.base_url);
        let response = self
            .with_secret(self.data.post(&url))
            .json(&request)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn send_stats(&self, metrics: &Metrics) -> ClientResult<()> {
        let request = StatsRequest {
            hostname: &self.hostname,
            timestamp: Utc::now(),
            metrics,
        };
        let url = format!("{}/api/v1/sync/stats", self.base_url);
        let response = self
            .with_secret(self.data.post(&url))
            .json(&request)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn send_logs(&self, lines: &[LogLine]) -> ClientResult<LogsResponse> {
        let request = LogsRequest {
            hostname: &self.hostname,
            lines,
        };
        let url = format!("{}/api/v1/sync/logs", self.base_url);
        let response = self
            .with_secret(self.data.post(&url))
            .json(&request)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    fn with_secret(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.sync_secret {
            Some(secret) => builder.header("x-sync-secret", secret),
            None => builder,
        }
    }
}

async fn check(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status().as_u16();
    if status >= 400 {
        return Err(AgentError::Api {
            status,
            body: response.text().await.unwrap_or_default(),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_status_matching() {
        let err = AgentError::Api {
            status: 404,
            body: "not found".to_string(),
        };
        assert!(err.is_status(404));
        assert!(!err.is_status(409));
    }

    #[test]
    fn ack_request_omits_empty_message() {
        let request = AckRequest {
            hostname: "proxy-01",
            hash: "abc",
            status: "ok",
            message: "",
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("message"));
    }

    #[test]
    fn config_response_deserializes_both_shapes() {
        let unchanged: ConfigResponse =
            serde_json::from_str(r#"{"unchanged":true,"capture_logs":false}"#).unwrap();
        assert!(unchanged.unchanged);
        assert!(unchanged.config.is_none());

        let changed: ConfigResponse = serde_json::from_str(
            r#"{
                "unchanged": false,
                "hash": "deadbeef",
                "config": {
                    "parent_config": "dest_domain=. go_direct=true\n",
                    "sni_yaml": "sni:\n",
                    "ip_allow_yaml": "ip_allow:\n"
                },
                "capture_logs": true,
                "capture_until": "2025-06-01T12:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(changed.hash.as_deref(), Some("deadbeef"));
        assert!(changed.config.is_some());
        assert!(changed.capture_until.is_some());
    }
}
