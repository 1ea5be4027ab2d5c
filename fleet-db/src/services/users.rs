//! Operator accounts. Creation is gated by the role matrix (root may
//! create admins and regulars, admin may create regulars); deletion is
//! a soft deactivation.

use fleet_core::types::{User, UserRole};
use fleet_core::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::repos::user;
use crate::services::audit::AuditService;
use crate::services::auth::hash_password;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserInput {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    pool: SqlitePool,
    audit: AuditService,
}

impl UserService {
    pub fn new(pool: SqlitePool, audit: AuditService) -> Self {
        Self { pool, audit }
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        user::list(&self.pool).await
    }

    pub async fn create(
        &self,
        actor_id: Uuid,
        actor_role: UserRole,
        input: CreateUserInput,
        ip: Option<&str>,
    ) -> Result<User> {
        if input.username.is_empty() || input.email.is_empty() || input.password.is_empty() {
            return Err(Error::BadRequest(
                "username, email and password are required".to_string(),
            ));
        }
        let Some(role) = UserRole::parse(&input.role) else {
            return Err(Error::BadRequest(format!(
                "role '{}' is not valid",
                input.role
            )));
        };
        if !actor_role.can_create(role) {
            return Err(Error::Forbidden(format!(
                "{} cannot create {} users",
                actor_role.as_str(),
                role.as_str()
            )));
        }

        let password_hash = hash_password(&input.password)?;
        let created =
            user::insert(&self.pool, &input.username, &input.email, &password_hash, role).await?;

        self.audit
            .record(
                Some(actor_id),
                "user.create",
                "user",
                Some(created.id),
                None,
                Some(json!({ "username": created.username, "role": role.as_str() })),
                ip,
            )
            .await;

        Ok(created)
    }

    pub async fn update(
        &self,
        actor_id: Uuid,
        actor_role: UserRole,
        id: Uuid,
        input: UpdateUserInput,
        ip: Option<&str>,
    ) -> Result<User> {
        let existing = user::get_by_id(&self.pool, id).await?;

        let role = match &input.role {
            Some(role) => {
                let Some(parsed) = UserRole::parse(role) else {
                    return Err(Error::BadRequest(format!("role '{role}' is not valid")));
                };
                if parsed != existing.role && !actor_role.can_create(parsed) {
                    return Err(Error::Forbidden(format!(
                        "{} cannot grant the {} role",
                        actor_role.as_str(),
                        parsed.as_str()
                    )));
                }
                parsed
            }
            None => existing.role,
        };
        let username = input.username.as_deref().unwrap_or(&existing.username);
        let is_active = input.is_active.unwrap_or(existing.is_active);

        user::update(&self.pool, id, username, role, is_active).await?;
        if let Some(password) = &input.password {
            let password_hash = hash_password(password)?;
            user::update_password(&self.pool, id, &password_hash).await?;
        }

        self.audit
            .record(
                Some(actor_id),
                "user.update",
                "user",
                Some(id),
                Some(json!({ "role": existing.role.as_str(), "is_active": existing.is_active })),
                Some(json!({ "role": role.as_str(), "is_active": is_active })),
                ip,
            )
            .await;

        user::get_by_id(&self.pool, id).await
    }

    /// Soft delete: flips the activation flag, the row stays.
    pub async fn delete(&self, actor_id: Uuid, id: Uuid, ip: Option<&str>) -> Result<()> {
        if actor_id == id {
            return Err(Error::BadRequest(
                "cannot delete your own account".to_string(),
            ));
        }
        let existing = user::get_by_id(&self.pool, id).await?;
        user::deactivate(&self.pool, id).await?;

        self.audit
            .record(
                Some(actor_id),
                "user.delete",
                "user",
                Some(id),
                Some(json!({ "username": existing.username })),
                None,
                ip,
            )
            .await;

        Ok(())
    }
}
