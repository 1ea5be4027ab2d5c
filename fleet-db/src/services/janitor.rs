//! Background maintenance: offline sweeps and data retention.
//!
//! Each job runs on its own interval with a short-lived database call;
//! failures are logged and the loop keeps going.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use fleet_core::Result;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::repos::{logs, proxy, stats};

/// A proxy unseen for this long is flipped offline.
pub fn staleness_window() -> Duration {
    Duration::minutes(2)
}

const OFFLINE_SWEEP_EVERY: StdDuration = StdDuration::from_secs(60);
const LOG_PURGE_EVERY: StdDuration = StdDuration::from_secs(5 * 60);
const STATS_PURGE_EVERY: StdDuration = StdDuration::from_secs(24 * 60 * 60);
const STATS_RETENTION_DAYS: i64 = 7;

#[derive(Clone)]
pub struct Janitor {
    pool: SqlitePool,
}

impl Janitor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Start the three periodic jobs. They stop when the shutdown
    /// channel fires.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            spawn_job(self.clone(), shutdown.clone(), OFFLINE_SWEEP_EVERY, Job::OfflineSweep),
            spawn_job(self.clone(), shutdown.clone(), LOG_PURGE_EVERY, Job::LogPurge),
            spawn_job(self.clone(), shutdown, STATS_PURGE_EVERY, Job::StatsPurge),
        ]
    }

    pub async fn sweep_offline(&self) -> Result<u64> {
        let cutoff = Utc::now() - staleness_window();
        proxy::mark_offline_stale(&self.pool, cutoff).await
    }

    pub async fn purge_expired_logs(&self) -> Result<u64> {
        logs::cleanup_expired(&self.pool, Utc::now()).await
    }

    pub async fn purge_old_stats(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(STATS_RETENTION_DAYS);
        stats::cleanup_old(&self.pool, cutoff).await
    }
}

#[derive(Clone, Copy, Debug)]
enum Job {
    OfflineSweep,
    LogPurge,
    StatsPurge,
}

fn spawn_job(
    janitor: Janitor,
    mut shutdown: watch::Receiver<bool>,
    every: StdDuration,
    job: Job,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = match job {
                        Job::OfflineSweep => janitor.sweep_offline().await,
                        Job::LogPurge => janitor.purge_expired_logs().await,
                        Job::StatsPurge => janitor.purge_old_stats().await,
                    };
                    match outcome {
                        Ok(affected) if affected > 0 => {
                            tracing::debug!(?job, affected, "janitor job done");
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!(?job, %err, "janitor job failed"),
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    })
}
