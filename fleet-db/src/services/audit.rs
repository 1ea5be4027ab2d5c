//! Best-effort audit trail.
//!
//! Audit writes must never fail the mutation they describe: a failed
//! insert is logged and swallowed, trading audit completeness for
//! availability. Readers of the trail must tolerate gaps.

use fleet_core::types::AuditLog;
use fleet_core::Result;
use serde_json::Value;
use sqlx::{SqliteExecutor, SqlitePool};
use uuid::Uuid;

use crate::repos::audit::{self, AuditFilter, NewAuditLog};

#[derive(Clone)]
pub struct AuditService {
    pool: SqlitePool,
}

impl AuditService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record an entry on the pool, outside any transaction.
    pub async fn record(
        &self,
        user_id: Option<Uuid>,
        action: &str,
        entity_type: &str,
        entity_id: Option<Uuid>,
        old_value: Option<Value>,
        new_value: Option<Value>,
        ip_address: Option<&str>,
    ) {
        record_on(
            &self.pool,
            user_id,
            action,
            entity_type,
            entity_id,
            old_value,
            new_value,
            ip_address,
        )
        .await;
    }

    pub async fn list(
        &self,
        filter: &AuditFilter,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<AuditLog>, i64)> {
        let offset = (page - 1) * limit;
        let entries = audit::list(&self.pool, filter, limit, offset).await?;
        let total = audit::count(&self.pool, filter).await?;
        Ok((entries, total))
    }
}

/// Same best-effort write on an arbitrary executor, so mutations can
/// audit inside their own transaction.
#[allow(clippy::too_many_arguments)]
pub async fn record_on(
    db: impl SqliteExecutor<'_>,
    user_id: Option<Uuid>,
    action: &str,
    entity_type: &str,
    entity_id: Option<Uuid>,
    old_value: Option<Value>,
    new_value: Option<Value>,
    ip_address: Option<&str>,
) {
    let entry = NewAuditLog {
        user_id,
        action,
        entity_type,
        entity_id,
        old_value,
        new_value,
        ip_address,
    };
    if let Err(err) = audit::insert(db, entry).await {
        tracing::warn!(action, %err, "audit write failed");
    }
}
