//! The agent-facing sync surface.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use fleet_db::services::sync::{
    AckRequest, ConfigResponse, LogsRequest, LogsResponse, RegisterRequest, RegisterResponse,
    StatsRequest,
};
use serde_json::{json, Value};

use crate::dto::SyncPollQuery;
use crate::error::ApiResult;
use crate::middleware::client_ip;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let remote_ip = client_ip(&headers).unwrap_or_else(|| "unknown".to_string());
    Ok(Json(state.sync.register(req, &remote_ip).await?))
}

pub async fn poll(
    State(state): State<AppState>,
    Query(query): Query<SyncPollQuery>,
) -> ApiResult<Json<ConfigResponse>> {
    let hash = query.hash.unwrap_or_default();
    Ok(Json(state.sync.poll(&query.hostname, &hash).await?))
}

pub async fn ack(
    State(state): State<AppState>,
    Json(req): Json<AckRequest>,
) -> ApiResult<Json<Value>> {
    state.sync.ack(req).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn stats(
    State(state): State<AppState>,
    Json(req): Json<StatsRequest>,
) -> ApiResult<Json<Value>> {
    state.sync.push_stats(req).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn logs(
    State(state): State<AppState>,
    Json(req): Json<LogsRequest>,
) -> ApiResult<Json<LogsResponse>> {
    Ok(Json(state.sync.push_logs(req).await?))
}
