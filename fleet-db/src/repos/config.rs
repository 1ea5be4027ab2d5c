//! Configuration rows and their lifecycle updates.
//!
//! The state-machine guards live in the SQL: every transition is
//! conditioned on the expected current status, and zero affected rows
//! surfaces as `invalid_status`. This is what makes two concurrent
//! approvals of the same configuration resolve to a single winner.

use chrono::Utc;
use fleet_core::types::{Config, ConfigStatus, RuleAction};
use fleet_core::{Error, Result};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::ConfigRow;
use crate::error::db_err;

const COLUMNS: &str = "id, name, description, status, version, default_action, fingerprint, \
     created_by, created_at, modified_by, modified_at, \
     submitted_by, submitted_at, approved_by, approved_at";

pub async fn get_by_id(db: impl SqliteExecutor<'_>, id: Uuid) -> Result<Config> {
    let row = sqlx::query_as::<_, ConfigRow>(&format!(
        "SELECT {COLUMNS}, 0 AS proxy_count FROM configs WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
    .map_err(db_err)?
    .ok_or_else(|| Error::NotFound(format!("config {id} not found")))?;
    Ok(row.into())
}

pub async fn count(db: impl SqliteExecutor<'_>, status: Option<ConfigStatus>) -> Result<i64> {
    let total = match status {
        Some(status) => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM configs WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(db)
                .await
        }
        None => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM configs")
                .fetch_one(db)
                .await
        }
    };
    total.map_err(db_err)
}

/// List with the assigned-proxy count joined in, newest modification first.
pub async fn list(
    db: impl SqliteExecutor<'_>,
    status: Option<ConfigStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Config>> {
    let select = format!(
        "SELECT {}, COUNT(cp.proxy_id) AS proxy_count
         FROM configs c LEFT JOIN config_proxies cp ON c.id = cp.config_id",
        COLUMNS
            .split(", ")
            .map(|col| format!("c.{col}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, ConfigRow>(&format!(
                "{select} WHERE c.status = ? GROUP BY c.id ORDER BY c.modified_at DESC LIMIT ? OFFSET ?"
            ))
            .bind(status.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await
        }
        None => {
            sqlx::query_as::<_, ConfigRow>(&format!(
                "{select} GROUP BY c.id ORDER BY c.modified_at DESC LIMIT ? OFFSET ?"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await
        }
    };
    Ok(rows.map_err(db_err)?.into_iter().map(Into::into).collect())
}

/// Insert a fresh draft. `version` is 1 for new configurations and
/// `source.version + 1` for clones.
pub async fn insert(
    db: impl SqliteExecutor<'_>,
    name: &str,
    description: Option<&str>,
    default_action: RuleAction,
    version: i64,
    created_by: Uuid,
) -> Result<Config> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO configs (id, name, description, status, version, default_action,
                              created_by, created_at, modified_by, modified_at)
         VALUES (?, ?, ?, 'draft', ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(version)
    .bind(default_action.as_str())
    .bind(created_by)
    .bind(now)
    .bind(created_by)
    .bind(now)
    .execute(db)
    .await
    .map_err(db_err)?;

    Ok(Config {
        id,
        name: name.to_string(),
        description: description.map(str::to_string),
        status: ConfigStatus::Draft,
        version,
        default_action,
        fingerprint: None,
        created_by: Some(created_by),
        created_at: now,
        modified_by: Some(created_by),
        modified_at: now,
        submitted_by: None,
        submitted_at: None,
        approved_by: None,
        approved_at: None,
        proxy_count: 0,
    })
}

/// Update the scalar fields of a draft. Editing anything but a draft is
/// an invalid transition.
pub async fn update_draft(
    db: impl SqliteExecutor<'_>,
    id: Uuid,
    name: &str,
    description: Option<&str>,
    default_action: RuleAction,
    modified_by: Uuid,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE configs SET name = ?, description = ?, default_action = ?,
                            modified_by = ?, modified_at = ?
         WHERE id = ? AND status = 'draft'",
    )
    .bind(name)
    .bind(description)
    .bind(default_action.as_str())
    .bind(modified_by)
    .bind(Utc::now())
    .bind(id)
    .execute(db)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(Error::InvalidStatus(
            "can only edit configs in draft status".to_string(),
        ));
    }
    Ok(())
}

pub async fn submit(db: impl SqliteExecutor<'_>, id: Uuid, user_id: Uuid) -> Result<()> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE configs SET status = 'pending_approval', submitted_by = ?, submitted_at = ?,
                            modified_by = ?, modified_at = ?
         WHERE id = ? AND status = 'draft'",
    )
    .bind(user_id)
    .bind(now)
    .bind(user_id)
    .bind(now)
    .bind(id)
    .execute(db)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(Error::InvalidStatus(
            "config is not in draft status".to_string(),
        ));
    }
    Ok(())
}

pub async fn approve(
    db: impl SqliteExecutor<'_>,
    id: Uuid,
    user_id: Uuid,
    fingerprint: &str,
) -> Result<()> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE configs SET status = 'active', approved_by = ?, approved_at = ?,
                            modified_by = ?, modified_at = ?, fingerprint = ?
         WHERE id = ? AND status = 'pending_approval'",
    )
    .bind(user_id)
    .bind(now)
    .bind(user_id)
    .bind(now)
    .bind(fingerprint)
    .bind(id)
    .execute(db)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(Error::InvalidStatus(
            "config is not pending approval".to_string(),
        ));
    }
    Ok(())
}

pub async fn reject(db: impl SqliteExecutor<'_>, id: Uuid) -> Result<()> {
    let result = sqlx::query(
        "UPDATE configs SET status = 'draft', submitted_by = NULL, submitted_at = NULL,
                            modified_at = ?
         WHERE id = ? AND status = 'pending_approval'",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(db)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(Error::InvalidStatus(
            "config is not pending approval".to_string(),
        ));
    }
    Ok(())
}

pub async fn update_fingerprint(
    db: impl SqliteExecutor<'_>,
    id: Uuid,
    fingerprint: &str,
) -> Result<()> {
    sqlx::query("UPDATE configs SET fingerprint = ? WHERE id = ?")
        .bind(fingerprint)
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn delete(db: impl SqliteExecutor<'_>, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM configs WHERE id = ?")
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("config {id} not found")));
    }
    Ok(())
}

/// The active configuration assigned to a hostname, if any.
pub async fn get_active_for_hostname(
    db: impl SqliteExecutor<'_>,
    hostname: &str,
) -> Result<Option<Config>> {
    let select = COLUMNS
        .split(", ")
        .map(|col| format!("c.{col}"))
        .collect::<Vec<_>>()
        .join(", ");
    let row = sqlx::query_as::<_, ConfigRow>(&format!(
        "SELECT {select}, 0 AS proxy_count
         FROM configs c
         JOIN config_proxies cp ON c.id = cp.config_id
         JOIN proxies p ON cp.proxy_id = p.id
         WHERE p.hostname = ? AND c.status = 'active'
         LIMIT 1"
    ))
    .bind(hostname)
    .fetch_optional(db)
    .await
    .map_err(db_err)?;
    Ok(row.map(Into::into))
}

/// Park every other active configuration that shares at least one proxy
/// with the given one. Displaced rows move to `approved`.
pub async fn deactivate_others(db: impl SqliteExecutor<'_>, active_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE configs SET status = 'approved'
         WHERE status = 'active' AND id != ?
           AND id IN (
             SELECT cp2.config_id FROM config_proxies cp2
             WHERE cp2.proxy_id IN (
               SELECT cp1.proxy_id FROM config_proxies cp1 WHERE cp1.config_id = ?
             )
           )",
    )
    .bind(active_id)
    .bind(active_id)
    .execute(db)
    .await
    .map_err(db_err)?;
    Ok(())
}
