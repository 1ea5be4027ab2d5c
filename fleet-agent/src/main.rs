//! Sidecar agent for a Traffic Server instance.
//!
//! Lifecycle: register until the backend accepts us, then run a health
//! loop (10 s) that owns the connectivity flag and re-registers after
//! outages, and a sync loop (every `--sync-interval`) that polls,
//! applies, reloads and acknowledges. Log capture runs as a transient
//! time-boxed task when the backend asks for it.

mod ats;
mod client;
mod config;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use ats::AtsManager;
use client::{ConfigResponse, SyncClient};
use config::{parse_duration, AgentConfig};

const HELLO_INTERVAL: Duration = Duration::from_secs(10);
const REGISTER_INTERVAL: Duration = Duration::from_secs(10);
const CAPTURE_TICK: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "fleet-agent")]
#[command(about = "Sidecar agent syncing a Traffic Server instance with the fleet control plane")]
#[command(version)]
struct Cli {
    /// Control plane base URL
    #[arg(long)]
    backend_url: String,

    /// Configuration id this proxy expects (informational; the server
    /// decides the actual assignment)
    #[arg(long)]
    config_id: String,

    /// Hostname to register under (default: OS hostname)
    #[arg(long)]
    hostname: Option<String>,

    /// Poll interval, e.g. 30s or 2m
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    sync_interval: Duration,

    /// Traffic Server configuration directory
    #[arg(long, default_value = "/opt/etc/trafficserver")]
    config_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Shared secret for the sync surface (also SYNC_SHARED_SECRET)
    #[arg(long)]
    sync_secret: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let hostname = match cli.hostname {
        Some(hostname) => hostname,
        None => match os_hostname() {
            Some(hostname) => hostname,
            None => {
                eprintln!("could not determine hostname; pass --hostname");
                std::process::exit(1);
            }
        },
    };

    let cfg = AgentConfig {
        backend_url: cli.backend_url,
        config_id: cli.config_id,
        hostname,
        sync_interval: cli.sync_interval,
        config_dir: cli.config_dir.into(),
        sync_secret: cli
            .sync_secret
            .or_else(|| std::env::var("SYNC_SHARED_SECRET").ok()),
    };

    tracing::info!(
        backend = %cfg.backend_url,
        hostname = %cfg.hostname,
        config_id = %cfg.config_id,
        interval = ?cfg.sync_interval,
        "starting fleet-agent"
    );

    let client = Arc::new(match SyncClient::new(&cfg) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("failed to build HTTP client: {err}");
            std::process::exit(1);
        }
    });
    let manager = Arc::new(AtsManager::new(&cfg.config_dir));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    // Phase 1: nothing happens until the backend accepts a registration.
    if !wait_for_register(&client, shutdown_rx.clone()).await {
        return;
    }

    // Phase 2: health loop owns the connectivity flag; sync loop polls.
    let connected = Arc::new(AtomicBool::new(true));
    tokio::spawn(hello_loop(
        client.clone(),
        connected.clone(),
        shutdown_rx.clone(),
    ));

    sync_loop(client, manager, connected, cfg.sync_interval, shutdown_rx).await;
    tracing::info!("agent stopped");
}

fn os_hostname() -> Option<String> {
    std::process::Command::new("hostname")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Retry registration on a fixed cadence until it succeeds. Returns
/// false if shutdown arrived first.
async fn wait_for_register(client: &SyncClient, mut shutdown: watch::Receiver<bool>) -> bool {
    tracing::info!("waiting for registration");

    if client.register().await.is_ok() {
        return true;
    }

    let mut ticker = tokio::time::interval(REGISTER_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => return false,
            _ = ticker.tick() => {
                match client.register().await {
                    Ok(()) => return true,
                    Err(err) => {
                        tracing::warn!(%err, "registration failed, retrying in {:?}", REGISTER_INTERVAL);
                    }
                }
            }
        }
    }
}

/// Ping `/health` every 10 s. Going offline pauses the sync loop; on
/// recovery the agent re-registers before syncing resumes, so a backend
/// that lost our record (or restarted empty) re-learns us first.
async fn hello_loop(
    client: Arc<SyncClient>,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(HELLO_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                match client.hello().await {
                    Err(err) => {
                        if connected.swap(false, Ordering::SeqCst) {
                            tracing::warn!(%err, "lost connection to backend");
                        }
                    }
                    Ok(()) => {
                        if !connected.load(Ordering::SeqCst) {
                            tracing::info!("backend reachable again, re-registering");
                            match client.register().await {
                                Ok(()) => {
                                    connected.store(true, Ordering::SeqCst);
                                    tracing::info!("re-registered, resuming sync");
                                }
                                Err(err) => tracing::warn!(%err, "re-registration failed"),
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn sync_loop(
    client: Arc<SyncClient>,
    manager: Arc<AtsManager>,
    connected: Arc<AtomicBool>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let capture_running = Arc::new(AtomicBool::new(false));
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                if !connected.load(Ordering::SeqCst) {
                    tracing::debug!("backend offline, skipping sync tick");
                    continue;
                }
                do_sync(&client, &manager, &connected, &capture_running, &shutdown).await;
            }
        }
    }
}

async fn do_sync(
    client: &Arc<SyncClient>,
    manager: &Arc<AtsManager>,
    connected: &Arc<AtomicBool>,
    capture_running: &Arc<AtomicBool>,
    shutdown: &watch::Receiver<bool>,
) {
    let current_hash = manager.current_hash();

    let response = match client.get_config(&current_hash).await {
        Ok(response) => response,
        Err(err) if err.is_status(404) => {
            // Our record is gone server-side; drop to offline so the
            // health loop re-registers before the next poll.
            tracing::warn!("backend no longer knows this proxy, re-registering");
            connected.store(false, Ordering::SeqCst);
            return;
        }
        Err(err) => {
            tracing::warn!(%err, "poll failed");
            return;
        }
    };

    maybe_start_capture(client, manager, capture_running, shutdown, &response);

    if response.unchanged {
        send_stats(client, manager).await;
        return;
    }

    let Some(hash) = response.hash.clone() else {
        tracing::warn!("changed response without a hash, ignoring");
        return;
    };
    let Some(files) = response.config else {
        tracing::warn!("changed response without config files, ignoring");
        return;
    };

    tracing::info!(from = %current_hash, to = %hash, "applying configuration");

    if let Err(err) = manager.apply_config(&files) {
        tracing::error!(%err, "failed to write config files");
        let _ = client.ack(&hash, "error", &err.to_string()).await;
        return;
    }
    if let Err(err) = manager.reload().await {
        tracing::error!(%err, "failed to reload proxy");
        let _ = client.ack(&hash, "error", &err).await;
        return;
    }
    if let Err(err) = manager.save_hash(&hash) {
        tracing::warn!(%err, "failed to persist fingerprint sentinel");
    }

    if let Err(err) = client.ack(&hash, "ok", "").await {
        tracing::warn!(%err, "failed to acknowledge apply");
    }
    tracing::info!(hash = %hash, "configuration applied");

    send_stats(client, manager).await;
}

async fn send_stats(client: &Arc<SyncClient>, manager: &Arc<AtsManager>) {
    let metrics = manager.collect_stats().await;
    if let Err(err) = client.send_stats(&metrics).await {
        tracing::warn!(%err, "failed to push stats");
    }
}

/// Start a capture task when the backend asks for one. A capture
/// already in flight makes new requests a no-op; a fresh window
/// requires the current one to end first.
fn maybe_start_capture(
    client: &Arc<SyncClient>,
    manager: &Arc<AtsManager>,
    capture_running: &Arc<AtomicBool>,
    shutdown: &watch::Receiver<bool>,
    response: &ConfigResponse,
) {
    if !response.capture_logs {
        return;
    }
    let Some(until) = response.capture_until else {
        return;
    };
    if capture_running.swap(true, Ordering::SeqCst) {
        return;
    }

    tokio::spawn(capture_and_send_logs(
        client.clone(),
        manager.clone(),
        capture_running.clone(),
        shutdown.clone(),
        until,
    ));
}

/// Enable the proxy's debug tap, tail and push matching lines every 5 s
/// until the deadline, then disable the tap again (also on shutdown).
async fn capture_and_send_logs(
    client: Arc<SyncClient>,
    manager: Arc<AtsManager>,
    capture_running: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
    until: DateTime<Utc>,
) {
    tracing::info!(%until, "starting log capture");

    if let Err(err) = manager.enable_debug().await {
        tracing::warn!(%err, "could not enable debug logging");
        capture_running.store(false, Ordering::SeqCst);
        return;
    }

    let mut ticker = tokio::time::interval(CAPTURE_TICK);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if Utc::now() > until {
                    break;
                }
                let lines = manager.capture_logs();
                if !lines.is_empty() {
                    match client.send_logs(&lines).await {
                        Ok(response) if !response.continue_capture => break,
                        Ok(_) => {}
                        Err(err) => tracing::warn!(%err, "failed to push captured logs"),
                    }
                }
            }
        }
    }

    if let Err(err) = manager.disable_debug().await {
        tracing::warn!(%err, "could not disable debug logging");
    }
    capture_running.store(false, Ordering::SeqCst);
    tracing::info!("log capture finished");
}
