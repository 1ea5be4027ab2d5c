//! End-to-end API tests over an in-memory database.

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use fleet_api::{create_router, AppState};
use fleet_core::types::UserRole;
use fleet_db::services::auth::hash_password;
use fleet_db::{connect_memory, init_schema};
use serde_json::{json, Value};
use sqlx::SqlitePool;

const JWT_SECRET: &str = "integration-test-secret";

async fn create_test_pool() -> SqlitePool {
    let pool = connect_memory().await.unwrap();
    init_schema(&pool).await.unwrap();
    pool
}

async fn seed_user(pool: &SqlitePool, username: &str, email: &str, role: UserRole) {
    let hash = hash_password("test-password").unwrap();
    fleet_db::repos::user::insert(pool, username, email, &hash, role)
        .await
        .unwrap();
}

async fn create_test_server(pool: SqlitePool, sync_secret: Option<String>) -> TestServer {
    let state = AppState::new(pool, JWT_SECRET.to_string(), sync_secret);
    TestServer::new(create_router(state)).unwrap()
}

async fn login(server: &TestServer, email: &str) -> String {
    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": email, "password": "test-password" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["token"].as_str().unwrap().to_string()
}

fn sample_config(proxy_ids: Vec<String>) -> Value {
    json!({
        "name": "corp-routing",
        "default_action": "direct",
        "domains": [
            { "domain": "*.internal.local", "action": "direct", "priority": 10 }
        ],
        "ip_ranges": [
            { "cidr": "10.0.0.0/8", "action": "direct", "priority": 10 }
        ],
        "parent_proxies": [
            { "address": "10.96.215.26", "port": 3128, "priority": 1, "enabled": true }
        ],
        "client_acl": [],
        "proxy_ids": proxy_ids
    })
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
async fn health_reports_ok() {
    let server = create_test_server(create_test_pool().await, None).await;
    let response = server.get("/api/v1/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert!(body["server_time"].is_string());
}

#[tokio::test]
async fn auth_is_required_on_management_routes() {
    let server = create_test_server(create_test_pool().await, None).await;
    let response = server.get("/api/v1/configs").await;
    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let pool = create_test_pool().await;
    seed_user(&pool, "admin", "admin@example.com", UserRole::Admin).await;
    let server = create_test_server(pool, None).await;

    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "admin@example.com", "password": "nope" }))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn login_refresh_beacon_logout_round_trip() {
    let pool = create_test_pool().await;
    seed_user(&pool, "admin", "admin@example.com", UserRole::Admin).await;
    let server = create_test_server(pool, None).await;

    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "admin@example.com", "password": "test-password" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let token = body["token"].as_str().unwrap();
    let refresh_token = body["refresh_token"].as_str().unwrap();
    assert!(body["expires_in"].as_i64().unwrap() > 0);
    assert_eq!(body["user"]["role"], "admin");

    let response = server
        .post("/api/v1/auth/beacon")
        .authorization_bearer(token)
        .await;
    response.assert_status_ok();

    let response = server
        .post("/api/v1/auth/refresh")
        .json(&json!({ "refresh_token": refresh_token }))
        .await;
    response.assert_status_ok();
    let refreshed: Value = response.json();
    assert!(refreshed["token"].is_string());

    let response = server
        .post("/api/v1/auth/logout")
        .authorization_bearer(token)
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn config_lifecycle_and_sync_delivery() {
    let pool = create_test_pool().await;
    seed_user(&pool, "admin", "admin@example.com", UserRole::Admin).await;
    let server = create_test_server(pool, None).await;
    let token = login(&server, "admin@example.com").await;

    // An agent registers first so the draft can target it.
    let response = server
        .post("/api/v1/sync/register")
        .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static("10.1.2.3"))
        .json(&json!({ "hostname": "proxy-01" }))
        .await;
    response.assert_status_ok();
    let registered: Value = response.json();
    let proxy_id = registered["proxy_id"].as_str().unwrap().to_string();

    // Create draft.
    let response = server
        .post("/api/v1/configs")
        .authorization_bearer(&token)
        .json(&sample_config(vec![proxy_id.clone()]))
        .await;
    response.assert_status_ok();
    let created: Value = response.json();
    let config_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "draft");
    assert_eq!(created["version"], 1);

    // Submit and approve (same user).
    let response = server
        .post(&format!("/api/v1/configs/{config_id}/submit"))
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();

    let response = server
        .post(&format!("/api/v1/configs/{config_id}/approve"))
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();
    let approved: Value = response.json();
    assert_eq!(approved["status"], "active");
    let fingerprint = approved["fingerprint"].as_str().unwrap().to_string();
    assert_eq!(fingerprint.len(), 64);

    // The agent polls with no local fingerprint and receives the files.
    let response = server
        .get("/api/v1/sync")
        .add_query_param("hostname", "proxy-01")
        .add_query_param("hash", "")
        .await;
    response.assert_status_ok();
    let poll: Value = response.json();
    assert_eq!(poll["unchanged"], false);
    assert_eq!(poll["hash"], fingerprint);
    assert_eq!(poll["config"]["parent_config"], EXPECTED_PARENT_CONFIG);

    // Ack, then a matching poll is unchanged.
    let response = server
        .post("/api/v1/sync/ack")
        .json(&json!({
            "hostname": "proxy-01",
            "hash": fingerprint,
            "status": "ok"
        }))
        .await;
    response.assert_status_ok();

    let response = server
        .get("/api/v1/sync")
        .add_query_param("hostname", "proxy-01")
        .add_query_param("hash", &fingerprint)
        .await;
    response.assert_status_ok();
    let poll: Value = response.json();
    assert_eq!(poll["unchanged"], true);

    // The fleet view reports convergence.
    let response = server
        .get("/api/v1/proxies")
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();
    let listing: Value = response.json();
    assert_eq!(listing["summary"]["total"], 1);
    assert_eq!(listing["data"][0]["config"]["in_sync"], true);
}

#[tokio::test]
async fn approval_by_another_user_is_forbidden() {
    let pool = create_test_pool().await;
    seed_user(&pool, "alice", "alice@example.com", UserRole::Admin).await;
    seed_user(&pool, "bob", "bob@example.com", UserRole::Admin).await;
    let server = create_test_server(pool, None).await;

    let alice = login(&server, "alice@example.com").await;
    let bob = login(&server, "bob@example.com").await;

    let response = server
        .post("/api/v1/configs")
        .authorization_bearer(&alice)
        .json(&sample_config(vec![]))
        .await;
    let config_id = response.json::<Value>()["id"].as_str().unwrap().to_string();

    server
        .post(&format!("/api/v1/configs/{config_id}/submit"))
        .authorization_bearer(&alice)
        .await
        .assert_status_ok();

    let response = server
        .post(&format!("/api/v1/configs/{config_id}/approve"))
        .authorization_bearer(&bob)
        .await;
    response.assert_status_forbidden();
    let body: Value = response.json();
    assert_eq!(body["error"], "forbidden");

    // Still pending, and the submitter can proceed.
    let response = server
        .get(&format!("/api/v1/configs/{config_id}"))
        .authorization_bearer(&alice)
        .await;
    assert_eq!(response.json::<Value>()["status"], "pending_approval");

    server
        .post(&format!("/api/v1/configs/{config_id}/approve"))
        .authorization_bearer(&alice)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn validation_errors_are_bad_requests() {
    let pool = create_test_pool().await;
    seed_user(&pool, "admin", "admin@example.com", UserRole::Admin).await;
    let server = create_test_server(pool, None).await;
    let token = login(&server, "admin@example.com").await;

    let mut body = sample_config(vec![]);
    body["parent_proxies"][0]["port"] = json!(80);
    let response = server
        .post("/api/v1/configs")
        .authorization_bearer(&token)
        .json(&body)
        .await;
    response.assert_status_bad_request();
    let err: Value = response.json();
    assert_eq!(err["error"], "bad_request");
    assert!(err["message"].as_str().unwrap().contains("port 80"));
}

#[tokio::test]
async fn regular_users_cannot_mutate_the_fleet() {
    let pool = create_test_pool().await;
    seed_user(&pool, "viewer", "viewer@example.com", UserRole::Regular).await;
    let server = create_test_server(pool.clone(), None).await;
    let token = login(&server, "viewer@example.com").await;

    // Register a proxy to target.
    let response = server
        .post("/api/v1/sync/register")
        .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static("10.1.2.3"))
        .json(&json!({ "hostname": "proxy-01" }))
        .await;
    let proxy_id = response.json::<Value>()["proxy_id"].as_str().unwrap().to_string();

    let response = server
        .delete(&format!("/api/v1/proxies/{proxy_id}"))
        .authorization_bearer(&token)
        .await;
    response.assert_status_forbidden();

    let response = server
        .get("/api/v1/audit")
        .authorization_bearer(&token)
        .await;
    response.assert_status_forbidden();
}

#[tokio::test]
async fn duplicate_hostname_from_another_host_conflicts() {
    let pool = create_test_pool().await;
    let server = create_test_server(pool, None).await;

    server
        .post("/api/v1/sync/register")
        .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static("10.1.2.3"))
        .json(&json!({ "hostname": "proxy-x" }))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/v1/sync/register")
        .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static("10.9.9.9"))
        .json(&json!({ "hostname": "proxy-x" }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn poll_for_unknown_hostname_is_404() {
    let server = create_test_server(create_test_pool().await, None).await;
    let response = server
        .get("/api/v1/sync")
        .add_query_param("hostname", "ghost")
        .add_query_param("hash", "")
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn sync_secret_guards_the_sync_surface_when_configured() {
    let pool = create_test_pool().await;
    let server = create_test_server(pool, Some("fleet-shared-secret".to_string())).await;

    let response = server
        .post("/api/v1/sync/register")
        .json(&json!({ "hostname": "proxy-01" }))
        .await;
    response.assert_status_unauthorized();

    let response = server
        .post("/api/v1/sync/register")
        .add_header(HeaderName::from_static("x-sync-secret"), HeaderValue::from_static("fleet-shared-secret"))
        .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static("10.1.2.3"))
        .json(&json!({ "hostname": "proxy-01" }))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn capture_duration_is_validated_at_the_api() {
    let pool = create_test_pool().await;
    seed_user(&pool, "admin", "admin@example.com", UserRole::Admin).await;
    let server = create_test_server(pool, None).await;
    let token = login(&server, "admin@example.com").await;

    let response = server
        .post("/api/v1/sync/register")
        .add_header(HeaderName::from_static("x-forwarded-for"), HeaderValue::from_static("10.1.2.3"))
        .json(&json!({ "hostname": "proxy-01" }))
        .await;
    let proxy_id = response.json::<Value>()["proxy_id"].as_str().unwrap().to_string();

    let response = server
        .post(&format!("/api/v1/proxies/{proxy_id}/logs"))
        .authorization_bearer(&token)
        .json(&json!({ "duration_minutes": 6 }))
        .await;
    response.assert_status_bad_request();

    let response = server
        .post(&format!("/api/v1/proxies/{proxy_id}/logs"))
        .authorization_bearer(&token)
        .json(&json!({ "duration_minutes": 2 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["capture_until"].is_string());
}

#[tokio::test]
async fn user_management_honours_the_role_matrix() {
    let pool = create_test_pool().await;
    seed_user(&pool, "root", "root@example.com", UserRole::Root).await;
    seed_user(&pool, "admin", "admin@example.com", UserRole::Admin).await;
    let server = create_test_server(pool, None).await;

    let root = login(&server, "root@example.com").await;
    let admin = login(&server, "admin@example.com").await;

    // Admin may create regulars but not admins.
    let response = server
        .post("/api/v1/users")
        .authorization_bearer(&admin)
        .json(&json!({
            "username": "viewer",
            "email": "viewer@example.com",
            "password": "test-password",
            "role": "regular"
        }))
        .await;
    response.assert_status_ok();
    let viewer_id = response.json::<Value>()["id"].as_str().unwrap().to_string();

    let response = server
        .post("/api/v1/users")
        .authorization_bearer(&admin)
        .json(&json!({
            "username": "admin2",
            "email": "admin2@example.com",
            "password": "test-password",
            "role": "admin"
        }))
        .await;
    response.assert_status_forbidden();

    // Root may create admins; only root may delete.
    let response = server
        .post("/api/v1/users")
        .authorization_bearer(&root)
        .json(&json!({
            "username": "admin2",
            "email": "admin2@example.com",
            "password": "test-password",
            "role": "admin"
        }))
        .await;
    response.assert_status_ok();

    let response = server
        .delete(&format!("/api/v1/users/{viewer_id}"))
        .authorization_bearer(&admin)
        .await;
    response.assert_status_forbidden();

    let response = server
        .delete(&format!("/api/v1/users/{viewer_id}"))
        .authorization_bearer(&root)
        .await;
    response.assert_status_ok();

    // Soft delete: the deactivated user can no longer log in.
    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "viewer@example.com", "password": "test-password" }))
        .await;
    response.assert_status_unauthorized();
}
