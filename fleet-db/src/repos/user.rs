use chrono::Utc;
use fleet_core::types::{User, UserRole};
use fleet_core::{Error, Result};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::entities::UserRow;
use crate::error::db_err;

const COLUMNS: &str =
    "id, username, email, password_hash, role, is_active, created_at, updated_at, last_login";

pub async fn get_by_id(db: impl SqliteExecutor<'_>, id: Uuid) -> Result<User> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
        .map_err(db_err)?
        .ok_or_else(|| Error::NotFound(format!("user {id} not found")))?;
    Ok(row.into())
}

pub async fn get_by_email(db: impl SqliteExecutor<'_>, email: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users WHERE email = ?"))
        .bind(email)
        .fetch_optional(db)
        .await
        .map_err(db_err)?;
    Ok(row.map(Into::into))
}

pub async fn list(db: impl SqliteExecutor<'_>) -> Result<Vec<User>> {
    let rows = sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users ORDER BY username"))
        .fetch_all(db)
        .await
        .map_err(db_err)?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn insert(
    db: impl SqliteExecutor<'_>,
    username: &str,
    email: &str,
    password_hash: &str,
    role: UserRole,
) -> Result<User> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role, is_active, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(id)
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(now)
    .bind(now)
    .execute(db)
    .await
    .map_err(db_err)?;

    Ok(User {
        id,
        username: username.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        role,
        is_active: true,
        created_at: now,
        updated_at: now,
        last_login: None,
    })
}

pub async fn update(
    db: impl SqliteExecutor<'_>,
    id: Uuid,
    username: &str,
    role: UserRole,
    is_active: bool,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE users SET username = ?, role = ?, is_active = ?, updated_at = ? WHERE id = ?",
    )
    .bind(username)
    .bind(role.as_str())
    .bind(is_active)
    .bind(Utc::now())
    .bind(id)
    .execute(db)
    .await
    .map_err(db_err)?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("user {id} not found")));
    }
    Ok(())
}

/// Users are never erased; deletion flips the activation flag.
pub async fn deactivate(db: impl SqliteExecutor<'_>, id: Uuid) -> Result<()> {
    let result = sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("user {id} not found")));
    }
    Ok(())
}

pub async fn update_password(
    db: impl SqliteExecutor<'_>,
    id: Uuid,
    password_hash: &str,
) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn touch_last_login(db: impl SqliteExecutor<'_>, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(db)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn count(db: impl SqliteExecutor<'_>) -> Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await
        .map_err(db_err)
}
