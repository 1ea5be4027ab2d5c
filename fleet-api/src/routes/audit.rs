//! Audit trail queries (admin+).

use axum::extract::{Query, State};
use axum::{Extension, Json};
use fleet_core::types::AuditLog;
use fleet_db::repos::audit::AuditFilter;

use crate::dto::{AuditQuery, Paginated};
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Paginated<AuditLog>>> {
    user.require_admin()?;

    let filter = AuditFilter {
        entity_type: query.entity_type,
        entity_id: query.entity_id,
        user_id: query.user_id,
        from: query.from,
        to: query.to,
    };
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    let (entries, total) = state.audit.list(&filter, page, limit).await?;
    Ok(Json(Paginated::new(entries, page, limit, total)))
}
