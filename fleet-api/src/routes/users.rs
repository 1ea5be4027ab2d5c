//! User management. Listing and creation require admin; deletion is
//! root-only.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use fleet_core::types::User;
use fleet_db::services::users::{CreateUserInput, UpdateUserInput};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::middleware::{client_ip, AuthUser};
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<User>>> {
    user.require_admin()?;
    Ok(Json(state.users.list().await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(input): Json<CreateUserInput>,
) -> ApiResult<Json<User>> {
    user.require_admin()?;
    let ip = client_ip(&headers);
    let created = state
        .users
        .create(user.id, user.role, input, ip.as_deref())
        .await?;
    Ok(Json(created))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(input): Json<UpdateUserInput>,
) -> ApiResult<Json<User>> {
    user.require_admin()?;
    let ip = client_ip(&headers);
    let updated = state
        .users
        .update(user.id, user.role, id, input, ip.as_deref())
        .await?;
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    user.require_root()?;
    let ip = client_ip(&headers);
    state.users.delete(user.id, id, ip.as_deref()).await?;
    Ok(Json(json!({ "status": "deleted" })))
}
