//! Local Traffic Server management: config files, reloads, counters and
//! the debug-log tap.
//!
//! The agent owns the config directory exclusively. File writes go
//! through a temp file and an atomic rename so a crash mid-write leaves
//! the previous file intact; the proxy only reads the files on reload.

use std::io;
use std::path::PathBuf;

use chrono::Utc;
use tokio::process::Command;

use crate::client::{ConfigFiles, LogLine, Metrics};

const HASH_SENTINEL: &str = ".config_hash";
const CAPTURE_TAIL_LINES: usize = 100;

/// Proxy-side counter names and where each lands in the snapshot.
/// Counters the proxy does not expose stay zero.
const METRIC_NAMES: &[(&str, fn(&mut Metrics) -> &mut i64)] = &[
    ("proxy.process.http.current_client_connections", |m| &mut m.active_connections),
    ("proxy.process.http.total_client_connections", |m| &mut m.total_connections),
    ("proxy.process.cache.ram_cache.hits", |m| &mut m.cache_hits),
    ("proxy.process.cache.ram_cache.misses", |m| &mut m.cache_misses),
    ("proxy.process.http.err_connect_fail_count_stat", |m| &mut m.errors),
    ("proxy.process.http.incoming_requests", |m| &mut m.total_requests),
    ("proxy.process.http.connect_requests", |m| &mut m.connect_requests),
    ("proxy.process.http.2xx_responses", |m| &mut m.responses_2xx),
    ("proxy.process.http.3xx_responses", |m| &mut m.responses_3xx),
    ("proxy.process.http.4xx_responses", |m| &mut m.responses_4xx),
    ("proxy.process.http.5xx_responses", |m| &mut m.responses_5xx),
    ("proxy.process.http.err_connect_fail_count_stat", |m| &mut m.err_connect_fail),
    ("proxy.process.http.err_client_abort_count_stat", |m| &mut m.err_client_abort),
    ("proxy.process.http.broken_server_connections", |m| &mut m.broken_server_conns),
    ("proxy.process.http.user_agent_total_request_bytes", |m| &mut m.bytes_in),
    ("proxy.process.http.user_agent_total_response_bytes", |m| &mut m.bytes_out),
];

pub struct AtsManager {
    config_dir: PathBuf,
    hash_file: PathBuf,
    diag_log: PathBuf,
}

impl AtsManager {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        Self {
            hash_file: config_dir.join(HASH_SENTINEL),
            config_dir,
            diag_log: PathBuf::from("/opt/var/log/trafficserver/diags.log"),
        }
    }

    #[cfg(test)]
    pub fn with_diag_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.diag_log = path.into();
        self
    }

    // Config files

    /// Write every non-empty artifact. Each file is replaced atomically;
    /// a failure part-way leaves already-written files in place and the
    /// rest untouched, which the fingerprint sentinel keeps visible as
    /// divergence.
    pub fn apply_config(&self, files: &ConfigFiles) -> io::Result<()> {
        if !files.parent_config.is_empty() {
            self.write_file("parent.config", &files.parent_config)?;
        }
        if !files.sni_yaml.is_empty() {
            self.write_file("sni.yaml", &files.sni_yaml)?;
        }
        if !files.ip_allow_yaml.is_empty() {
            self.write_file("ip_allow.yaml", &files.ip_allow_yaml)?;
        }
        Ok(())
    }

    fn write_file(&self, name: &str, content: &str) -> io::Result<()> {
        let path = self.config_dir.join(name);
        let tmp = self.config_dir.join(format!("{name}.tmp"));
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)
    }

    // Reload

    pub async fn reload(&self) -> Result<(), String> {
        let output = Command::new("traffic_ctl")
            .args(["config", "reload"])
            .output()
            .await
            .map_err(|e| format!("spawn traffic_ctl: {e}"))?;
        if !output.status.success() {
            return Err(format!(
                "traffic_ctl config reload failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(())
    }

    // Fingerprint sentinel

    /// Fingerprint of the configuration currently applied on disk.
    /// Empty when none has ever been applied.
    pub fn current_hash(&self) -> String {
        std::fs::read_to_string(&self.hash_file)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    pub fn save_hash(&self, hash: &str) -> io::Result<()> {
        std::fs::write(&self.hash_file, hash)
    }

    // Counters

    pub async fn collect_stats(&self) -> Metrics {
        let mut metrics = Metrics::default();
        for (name, field) in METRIC_NAMES {
            if let Some(value) = self.get_metric(name).await {
                *field(&mut metrics) = value;
            }
        }
        metrics
    }

    async fn get_metric(&self, name: &str) -> Option<i64> {
        let output = Command::new("traffic_ctl")
            .args(["metric", "get", name])
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_metric_output(&String::from_utf8_lossy(&output.stdout))
    }

    // Debug-log capture

    pub async fn enable_debug(&self) -> Result<(), String> {
        self.set_config("proxy.config.diags.debug.enabled", "1").await?;
        self.set_config("proxy.config.diags.debug.tags", "parent_select").await
    }

    pub async fn disable_debug(&self) -> Result<(), String> {
        self.set_config("proxy.config.diags.debug.enabled", "0").await
    }

    async fn set_config(&self, name: &str, value: &str) -> Result<(), String> {
        let output = Command::new("traffic_ctl")
            .args(["config", "set", name, value])
            .output()
            .await
            .map_err(|e| format!("spawn traffic_ctl: {e}"))?;
        if !output.status.success() {
            return Err(format!(
                "traffic_ctl config set {name} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(())
    }

    /// Tail the diagnostic log and keep the parent-selection lines.
    pub fn capture_logs(&self) -> Vec<LogLine> {
        let Ok(content) = std::fs::read_to_string(&self.diag_log) else {
            return Vec::new();
        };
        let lines: Vec<&str> = content.lines().collect();
        let tail = lines.len().saturating_sub(CAPTURE_TAIL_LINES);
        lines[tail..]
            .iter()
            .filter(|line| is_capture_line(line))
            .map(|line| LogLine {
                timestamp: Utc::now(),
                level: "DEBUG".to_string(),
                message: line.to_string(),
            })
            .collect()
    }
}

fn is_capture_line(line: &str) -> bool {
    line.contains("Result for") || line.contains("parent")
}

/// `traffic_ctl metric get` prints `name value`; take the last field.
fn parse_metric_output(output: &str) -> Option<i64> {
    output.split_whitespace().last()?.parse().ok()
}
