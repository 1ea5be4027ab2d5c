//! Login, refresh, keep-alive and logout.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use fleet_db::services::auth::{LoginResponse, RefreshResponse};
use serde_json::{json, Value};

use crate::dto::{LoginRequest, RefreshRequest};
use crate::error::ApiResult;
use crate::middleware::{client_ip, AuthUser};
use crate::state::AppState;

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let ip = client_ip(&headers);
    let resp = state.auth.login(&req.email, &req.password, ip.as_deref()).await?;
    Ok(Json(resp))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let resp = state.auth.refresh(&req.refresh_token).await?;
    Ok(Json(resp))
}

pub async fn beacon(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    state.auth.beacon(&user.token).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    state.auth.logout(&user.token).await?;
    Ok(Json(json!({ "status": "ok" })))
}
