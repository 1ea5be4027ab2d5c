//! Configuration lifecycle endpoints.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use fleet_core::types::{Config, ConfigInput, ConfigStatus};
use fleet_core::Error;
use fleet_db::services::configs::ConfigDetail;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::dto::{ListConfigsQuery, Paginated};
use crate::error::ApiResult;
use crate::middleware::{client_ip, AuthUser};
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListConfigsQuery>,
) -> ApiResult<Json<Paginated<Config>>> {
    let status = match &query.status {
        Some(s) => Some(
            ConfigStatus::parse(s)
                .ok_or_else(|| Error::BadRequest(format!("invalid status '{s}'")))?,
        ),
        None => None,
    };
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(20);

    let (configs, total) = state.configs.list(status, page, limit).await?;
    Ok(Json(Paginated::new(configs, page, limit, total)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ConfigDetail>> {
    Ok(Json(state.configs.get_detail(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(input): Json<ConfigInput>,
) -> ApiResult<Json<ConfigDetail>> {
    let ip = client_ip(&headers);
    let detail = state.configs.create(input, user.id, ip.as_deref()).await?;
    Ok(Json(detail))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<ConfigInput>,
) -> ApiResult<Json<ConfigDetail>> {
    let ip = client_ip(&headers);
    let detail = state.configs.update(id, input, user.id, ip.as_deref()).await?;
    Ok(Json(detail))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    user.require_admin()?;
    let ip = client_ip(&headers);
    state.configs.delete(id, user.id, ip.as_deref()).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

pub async fn submit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Config>> {
    let ip = client_ip(&headers);
    Ok(Json(state.configs.submit(id, user.id, ip.as_deref()).await?))
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Config>> {
    let ip = client_ip(&headers);
    Ok(Json(state.configs.approve(id, user.id, ip.as_deref()).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Config>> {
    let ip = client_ip(&headers);
    Ok(Json(state.configs.reject(id, user.id, ip.as_deref()).await?))
}

pub async fn clone_config(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<ConfigDetail>> {
    let ip = client_ip(&headers);
    let detail = state.configs.clone_config(id, user.id, ip.as_deref()).await?;
    Ok(Json(detail))
}
