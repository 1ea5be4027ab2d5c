//! Route table.

pub mod audit;
pub mod auth;
pub mod configs;
pub mod health;
pub mod proxies;
pub mod sync;
pub mod users;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;

use crate::middleware::{require_auth, require_sync_secret};
use crate::state::AppState;

/// Build the full `/api/v1` router.
pub fn create_router(state: AppState) -> Router {
    // Spoken by the sidecar agents; no bearer auth, optionally guarded
    // by the shared secret.
    let sync_routes = Router::new()
        .route("/sync/register", post(sync::register))
        .route("/sync", get(sync::poll))
        .route("/sync/ack", post(sync::ack))
        .route("/sync/stats", post(sync::stats))
        .route("/sync/logs", post(sync::logs))
        .layer(from_fn_with_state(state.clone(), require_sync_secret));

    let protected = Router::new()
        .route("/auth/beacon", post(auth::beacon))
        .route("/auth/logout", post(auth::logout))
        // Configurations
        .route("/configs", get(configs::list).post(configs::create))
        .route(
            "/configs/:id",
            get(configs::get).put(configs::update).delete(configs::delete),
        )
        .route("/configs/:id/submit", post(configs::submit))
        .route("/configs/:id/approve", post(configs::approve))
        .route("/configs/:id/reject", post(configs::reject))
        .route("/configs/:id/clone", post(configs::clone_config))
        // Fleet
        .route("/proxies", get(proxies::list))
        .route("/proxies/:id", get(proxies::get).delete(proxies::delete))
        .route(
            "/proxies/:id/logs",
            post(proxies::start_capture).get(proxies::get_logs),
        )
        .route("/proxies/:id/config", put(proxies::assign_config))
        // Users
        .route("/users", get(users::list).post(users::create))
        .route("/users/:id", put(users::update).delete(users::delete))
        // Audit
        .route("/audit", get(audit::list))
        .layer(from_fn_with_state(state.clone(), require_auth));

    let api = Router::new()
        .route("/health", get(health::health_check))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .merge(sync_routes)
        .merge(protected);

    Router::new().nest("/api/v1", api).with_state(state)
}
