//! Fleet endpoints.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use fleet_core::types::ProxyLogLine;
use fleet_db::services::proxies::{ProxyDetail, ProxyListResponse};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dto::{AssignConfigRequest, StartCaptureRequest, StartCaptureResponse};
use crate::error::ApiResult;
use crate::middleware::{client_ip, AuthUser};
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<ProxyListResponse>> {
    Ok(Json(state.proxies.list().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProxyDetail>> {
    Ok(Json(state.proxies.get_detail(id).await?))
}

pub async fn start_capture(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<StartCaptureRequest>,
) -> ApiResult<Json<StartCaptureResponse>> {
    let ip = client_ip(&headers);
    let capture_until = state
        .proxies
        .start_log_capture(id, req.duration_minutes, user.id, ip.as_deref())
        .await?;
    Ok(Json(StartCaptureResponse { capture_until }))
}

pub async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ProxyLogLine>>> {
    Ok(Json(state.proxies.get_logs(id).await?))
}

pub async fn assign_config(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<AssignConfigRequest>,
) -> ApiResult<Json<Value>> {
    user.require_admin()?;
    let ip = client_ip(&headers);
    state
        .proxies
        .assign_config(id, req.config_id, user.id, ip.as_deref())
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    user.require_admin()?;
    let ip = client_ip(&headers);
    state.proxies.delete(id, user.id, ip.as_deref()).await?;
    Ok(Json(json!({ "status": "deleted" })))
}
