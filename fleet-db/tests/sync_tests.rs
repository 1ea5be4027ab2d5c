//! Sync protocol and fleet registry tests.

use chrono::{Duration, Utc};
use fleet_core::types::{
    ConfigInput, DomainRuleInput, IpRangeInput, ParentProxyInput, ProxyMetrics, UserRole,
};
use fleet_core::Error;
use fleet_db::services::sync::{AckRequest, LogLine, LogsRequest, RegisterRequest, StatsRequest};
use fleet_db::services::{AuditService, ConfigService, Janitor, ProxyService, SyncService};
use fleet_db::{connect_memory, init_schema};
use sqlx::SqlitePool;
use uuid::Uuid;

async fn setup() -> SqlitePool {
    let pool = connect_memory().await.unwrap();
    init_schema(&pool).await.unwrap();
    pool
}

async fn seed_user(pool: &SqlitePool) -> Uuid {
    let hash = fleet_db::services::auth::hash_password("seed-password").unwrap();
    fleet_db::repos::user::insert(pool, "operator", "op@example.com", &hash, UserRole::Admin)
        .await
        .unwrap()
        .id
}

fn register_request(hostname: &str, proxy_id: Option<&str>) -> RegisterRequest {
    RegisterRequest {
        hostname: hostname.to_string(),
        config_id: None,
        proxy_id: proxy_id.map(str::to_string),
    }
}

/// Create, submit and approve the S-1 configuration assigned to the
/// given proxy. Returns the config id.
async fn approve_sample_config(pool: &SqlitePool, user: Uuid, proxy_id: Uuid) -> Uuid {
    let svc = ConfigService::new(pool.clone());
    let input = ConfigInput {
        name: "corp-routing".to_string(),
        default_action: "direct".to_string(),
        domains: vec![DomainRuleInput {
            domain: "*.internal.local".to_string(),
            action: "direct".to_string(),
            priority: 10,
        }],
        ip_ranges: vec![IpRangeInput {
            cidr: "10.0.0.0/8".to_string(),
            action: "direct".to_string(),
            priority: 10,
        }],
        parent_proxies: vec![ParentProxyInput {
            address: "10.96.215.26".to_string(),
            port: 3128,
            priority: 1,
            enabled: true,
        }],
        client_acl: vec![],
        proxy_ids: vec![proxy_id],
        ..Default::default()
    };
    let detail = svc.create(input, user, None).await.unwrap();
    svc.submit(detail.config.id, user, None).await.unwrap();
    svc.approve(detail.config.id, user, None).await.unwrap();
    detail.config.id
}

const EXPECTED_PARENT_CONFIG: &str = "# Localhost\n\
dest_ip=127.0.0.0-127.255.255.255 go_direct=true\n\
# Link-local\n\
dest_ip=169.254.0.0-169.254.255.255 go_direct=true\n\
# Kubernetes\n\
dest_domain=.svc.cluster.local go_direct=true\n\
dest_domain=.cluster.local go_direct=true\n\
dest_domain=localhost go_direct=true\n\
\n\
dest_ip=10.0.0.0-10.255.255.255 go_direct=true\n\
dest_domain=.internal.local go_direct=true\n\
dest_domain=. go_direct=true\n";

#[tokio::test]
async fn register_creates_and_reclaims_by_identity() {
    let pool = setup().await;
    let sync = SyncService::new(pool.clone());

    let first = sync
        .register(register_request("proxy-x", None), "10.1.2.3")
        .await
        .unwrap();

    // Same source address re-registers freely while online.
    let same_ip = sync
        .register(register_request("proxy-x", None), "10.1.2.3")
        .await
        .unwrap();
    assert_eq!(same_ip.proxy_id, first.proxy_id);

    // Different address without the prior id conflicts.
    let err = sync
        .register(register_request("proxy-x", None), "10.9.9.9")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // Presenting the issued id succeeds from anywhere.
    let same_id = sync
        .register(register_request("proxy-x", Some(&first.proxy_id)), "10.9.9.9")
        .await
        .unwrap();
    assert_eq!(same_id.proxy_id, first.proxy_id);
}

#[tokio::test]
async fn offline_records_are_reclaimable() {
    let pool = setup().await;
    let sync = SyncService::new(pool.clone());

    let first = sync
        .register(register_request("proxy-x", None), "10.1.2.3")
        .await
        .unwrap();
    let id = Uuid::parse_str(&first.proxy_id).unwrap();

    // Janitor flipped it offline after the staleness window.
    sqlx::query("UPDATE proxies SET is_online = 0 WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();

    let reclaimed = sync
        .register(register_request("proxy-x", None), "10.9.9.9")
        .await
        .unwrap();
    assert_eq!(reclaimed.proxy_id, first.proxy_id);
}

#[tokio::test]
async fn register_requires_hostname() {
    let pool = setup().await;
    let sync = SyncService::new(pool.clone());
    let err = sync
        .register(register_request("", None), "10.1.2.3")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn poll_delivers_exact_artifacts_and_ack_converges() {
    let pool = setup().await;
    let user = seed_user(&pool).await;
    let sync = SyncService::new(pool.clone());

    let registered = sync
        .register(register_request("proxy-01", None), "10.1.2.3")
        .await
        .unwrap();
    let proxy_id = Uuid::parse_str(&registered.proxy_id).unwrap();
    let config_id = approve_sample_config(&pool, user, proxy_id).await;

    // First poll with an empty fingerprint diverges and carries the files.
    let resp = sync.poll("proxy-01", "").await.unwrap();
    assert!(!resp.unchanged);
    let files = resp.config.as_ref().unwrap();
    assert_eq!(files.parent_config, EXPECTED_PARENT_CONFIG);
    assert!(files.sni_yaml.contains("*.internal.local"));
    assert!(files.ip_allow_yaml.contains("set_deny"));
    let hash = resp.hash.clone().unwrap();
    assert_eq!(hash.len(), 64);

    // The approval stored the same fingerprint the poll serves.
    let cfg = fleet_db::repos::config::get_by_id(&pool, config_id).await.unwrap();
    assert_eq!(cfg.fingerprint.as_deref(), Some(hash.as_str()));

    // Ack success records convergence.
    sync.ack(AckRequest {
        hostname: "proxy-01".to_string(),
        hash: hash.clone(),
        status: "ok".to_string(),
        message: None,
    })
    .await
    .unwrap();
    let row = fleet_db::repos::proxy::get_by_id(&pool, proxy_id).await.unwrap();
    assert_eq!(row.observed_fingerprint.as_deref(), Some(hash.as_str()));

    // Matching fingerprint polls are unchanged.
    let resp = sync.poll("proxy-01", &hash).await.unwrap();
    assert!(resp.unchanged);
    assert!(resp.config.is_none());
}

#[tokio::test]
async fn ack_error_leaves_fingerprint_untouched() {
    let pool = setup().await;
    let user = seed_user(&pool).await;
    let sync = SyncService::new(pool.clone());

    let registered = sync
        .register(register_request("proxy-01", None), "10.1.2.3")
        .await
        .unwrap();
    let proxy_id = Uuid::parse_str(&registered.proxy_id).unwrap();
    approve_sample_config(&pool, user, proxy_id).await;

    let resp = sync.poll("proxy-01", "").await.unwrap();
    sync.ack(AckRequest {
        hostname: "proxy-01".to_string(),
        hash: resp.hash.unwrap(),
        status: "error".to_string(),
        message: Some("reload failed".to_string()),
    })
    .await
    .unwrap();

    let row = fleet_db::repos::proxy::get_by_id(&pool, proxy_id).await.unwrap();
    assert!(row.observed_fingerprint.is_none());
}

#[tokio::test]
async fn poll_without_assignment_is_unchanged() {
    let pool = setup().await;
    let sync = SyncService::new(pool.clone());
    sync.register(register_request("proxy-01", None), "10.1.2.3")
        .await
        .unwrap();

    let resp = sync.poll("proxy-01", "").await.unwrap();
    assert!(resp.unchanged);
    assert!(!resp.capture_logs);
}

#[tokio::test]
async fn poll_unknown_hostname_is_not_found() {
    let pool = setup().await;
    let sync = SyncService::new(pool.clone());
    let err = sync.poll("ghost", "").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn poll_fills_missing_fingerprint_lazily() {
    let pool = setup().await;
    let user = seed_user(&pool).await;
    let sync = SyncService::new(pool.clone());

    let registered = sync
        .register(register_request("proxy-01", None), "10.1.2.3")
        .await
        .unwrap();
    let proxy_id = Uuid::parse_str(&registered.proxy_id).unwrap();
    let config_id = approve_sample_config(&pool, user, proxy_id).await;

    // Simulate a configuration activated before fingerprinting existed.
    sqlx::query("UPDATE configs SET fingerprint = NULL WHERE id = ?")
        .bind(config_id)
        .execute(&pool)
        .await
        .unwrap();

    let resp = sync.poll("proxy-01", "").await.unwrap();
    let hash = resp.hash.unwrap();
    let cfg = fleet_db::repos::config::get_by_id(&pool, config_id).await.unwrap();
    assert_eq!(cfg.fingerprint.as_deref(), Some(hash.as_str()));
}

#[tokio::test]
async fn stats_push_stores_a_sample_and_refreshes_liveness() {
    let pool = setup().await;
    let sync = SyncService::new(pool.clone());
    let registered = sync
        .register(register_request("proxy-01", None), "10.1.2.3")
        .await
        .unwrap();
    let proxy_id = Uuid::parse_str(&registered.proxy_id).unwrap();

    sync.push_stats(StatsRequest {
        hostname: "proxy-01".to_string(),
        timestamp: Utc::now(),
        metrics: ProxyMetrics {
            active_connections: 4,
            total_requests: 100,
            ..Default::default()
        },
    })
    .await
    .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM proxy_stats WHERE proxy_id = ?")
        .bind(proxy_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let row = fleet_db::repos::proxy::get_by_id(&pool, proxy_id).await.unwrap();
    assert!(row.is_online);
    assert!(row.last_seen.is_some());
}

#[tokio::test]
async fn log_push_stores_lines_and_reports_capture_state() {
    let pool = setup().await;
    let user = seed_user(&pool).await;
    let sync = SyncService::new(pool.clone());
    let audit = AuditService::new(pool.clone());
    let proxies = ProxyService::new(pool.clone(), audit);

    let registered = sync
        .register(register_request("proxy-01", None), "10.1.2.3")
        .await
        .unwrap();
    let proxy_id = Uuid::parse_str(&registered.proxy_id).unwrap();

    // No window open: lines are stored but capture does not continue.
    let resp = sync
        .push_logs(LogsRequest {
            hostname: "proxy-01".to_string(),
            lines: vec![LogLine {
                timestamp: Utc::now(),
                level: "DEBUG".to_string(),
                message: "Result for parent lookup".to_string(),
            }],
        })
        .await
        .unwrap();
    assert!(resp.received);
    assert!(!resp.continue_capture);

    // Open a 2-minute window; the poll advertises it and pushes continue.
    let until = proxies
        .start_log_capture(proxy_id, 2, user, None)
        .await
        .unwrap();
    assert!(until > Utc::now());

    let poll = sync.poll("proxy-01", "").await.unwrap();
    assert!(poll.capture_logs);
    assert_eq!(poll.capture_until, Some(until));

    let resp = sync
        .push_logs(LogsRequest {
            hostname: "proxy-01".to_string(),
            lines: vec![],
        })
        .await
        .unwrap();
    assert!(resp.continue_capture);

    let lines = proxies.get_logs(proxy_id).await.unwrap();
    assert_eq!(lines.len(), 1);
}

#[tokio::test]
async fn capture_duration_is_bounded() {
    let pool = setup().await;
    let user = seed_user(&pool).await;
    let audit = AuditService::new(pool.clone());
    let proxies = ProxyService::new(pool.clone(), audit);
    let sync = SyncService::new(pool.clone());
    let registered = sync
        .register(register_request("proxy-01", None), "10.1.2.3")
        .await
        .unwrap();
    let proxy_id = Uuid::parse_str(&registered.proxy_id).unwrap();

    for bad in [0, 6, -1] {
        let err = proxies
            .start_log_capture(proxy_id, bad, user, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)), "duration {bad}");
    }
    for good in [1, 5] {
        proxies.start_log_capture(proxy_id, good, user, None).await.unwrap();
    }
}

#[tokio::test]
async fn janitor_sweeps_stale_proxies_and_expired_data() {
    let pool = setup().await;
    let sync = SyncService::new(pool.clone());
    let janitor = Janitor::new(pool.clone());

    let registered = sync
        .register(register_request("proxy-01", None), "10.1.2.3")
        .await
        .unwrap();
    let proxy_id = Uuid::parse_str(&registered.proxy_id).unwrap();

    // Fresh proxy survives the sweep.
    assert_eq!(janitor.sweep_offline().await.unwrap(), 0);

    // Backdate liveness past the staleness window.
    sqlx::query("UPDATE proxies SET last_seen = ? WHERE id = ?")
        .bind(Utc::now() - Duration::minutes(3))
        .bind(proxy_id)
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(janitor.sweep_offline().await.unwrap(), 1);
    let row = fleet_db::repos::proxy::get_by_id(&pool, proxy_id).await.unwrap();
    assert!(!row.is_online);

    // Expired log lines and old samples are purged.
    fleet_db::repos::logs::insert(
        &pool,
        proxy_id,
        Utc::now() - Duration::hours(2),
        Some("DEBUG"),
        Some("old line"),
        Utc::now() - Duration::hours(1),
    )
    .await
    .unwrap();
    assert_eq!(janitor.purge_expired_logs().await.unwrap(), 1);

    fleet_db::repos::stats::insert(
        &pool,
        proxy_id,
        Utc::now() - Duration::days(8),
        &ProxyMetrics::default(),
    )
    .await
    .unwrap();
    assert_eq!(janitor.purge_old_stats().await.unwrap(), 1);
}

#[tokio::test]
async fn proxy_list_reports_fleet_summary_and_convergence() {
    let pool = setup().await;
    let user = seed_user(&pool).await;
    let sync = SyncService::new(pool.clone());
    let audit = AuditService::new(pool.clone());
    let proxies = ProxyService::new(pool.clone(), audit);

    let registered = sync
        .register(register_request("proxy-01", None), "10.1.2.3")
        .await
        .unwrap();
    let proxy_id = Uuid::parse_str(&registered.proxy_id).unwrap();
    approve_sample_config(&pool, user, proxy_id).await;

    // Before any ack the proxy is out of sync.
    let listing = proxies.list().await.unwrap();
    assert_eq!(listing.summary.total, 1);
    assert_eq!(listing.summary.online, 1);
    let config_ref = listing.data[0].config.as_ref().unwrap();
    assert!(!config_ref.in_sync);

    // After a successful ack it converges.
    let resp = sync.poll("proxy-01", "").await.unwrap();
    sync.ack(AckRequest {
        hostname: "proxy-01".to_string(),
        hash: resp.hash.unwrap(),
        status: "ok".to_string(),
        message: None,
    })
    .await
    .unwrap();

    let listing = proxies.list().await.unwrap();
    assert!(listing.data[0].config.as_ref().unwrap().in_sync);
}
