//! Operator identities and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Root,
    Admin,
    Regular,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Root => "root",
            UserRole::Admin => "admin",
            UserRole::Regular => "regular",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "root" => Some(UserRole::Root),
            "admin" => Some(UserRole::Admin),
            "regular" => Some(UserRole::Regular),
            _ => None,
        }
    }

    /// Whether this role may create users with the target role.
    pub fn can_create(&self, target: UserRole) -> bool {
        match self {
            UserRole::Root => matches!(target, UserRole::Admin | UserRole::Regular),
            UserRole::Admin => matches!(target, UserRole::Regular),
            UserRole::Regular => false,
        }
    }

    /// Roles allowed to perform fleet and configuration mutations.
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Root | UserRole::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2 hash; never serialized.
    #[serde(skip)]
    pub password_hash: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_creation_matrix() {
        assert!(UserRole::Root.can_create(UserRole::Admin));
        assert!(UserRole::Root.can_create(UserRole::Regular));
        assert!(!UserRole::Root.can_create(UserRole::Root));
        assert!(UserRole::Admin.can_create(UserRole::Regular));
        assert!(!UserRole::Admin.can_create(UserRole::Admin));
        assert!(!UserRole::Regular.can_create(UserRole::Regular));
    }
}
