//! Login sessions and bearer tokens.
//!
//! Tokens are HS256 JWTs carrying the user id and role; the database
//! only ever sees SHA-256 hashes of the issued token pair. Passwords
//! are argon2id hashes.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use fleet_core::types::User;
use fleet_core::{Error, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::repos::{session, user};
use crate::services::audit::AuditService;

const TOKEN_TTL_SECS: i64 = 3600;

/// Claims carried by every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub token: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct AuthService {
    pool: SqlitePool,
    jwt_secret: String,
    audit: AuditService,
}

impl AuthService {
    pub fn new(pool: SqlitePool, jwt_secret: String, audit: AuditService) -> Self {
        Self {
            pool,
            jwt_secret,
            audit,
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<LoginResponse> {
        let Some(found) = user::get_by_email(&self.pool, email).await? else {
            return Err(Error::Unauthorized("invalid credentials".to_string()));
        };
        if !found.is_active || !verify_password(password, &found.password_hash) {
            return Err(Error::Unauthorized("invalid credentials".to_string()));
        }

        let token = self.issue_token(&found)?;
        let refresh_token = random_token();
        let expires_at = Utc::now() + Duration::seconds(TOKEN_TTL_SECS);

        session::insert(
            &self.pool,
            found.id,
            &hash_token(&token),
            &hash_token(&refresh_token),
            ip,
            expires_at,
        )
        .await?;
        user::touch_last_login(&self.pool, found.id).await?;

        self.audit
            .record(Some(found.id), "auth.login", "user", Some(found.id), None, None, ip)
            .await;

        Ok(LoginResponse {
            token,
            refresh_token,
            expires_in: TOKEN_TTL_SECS,
            user: found,
        })
    }

    /// Trade a refresh token for a fresh access token; the session row
    /// rotates its stored token hash.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let Some(found) = session::get_by_refresh_hash(&self.pool, &hash_token(refresh_token)).await?
        else {
            return Err(Error::Unauthorized("invalid refresh token".to_string()));
        };

        let account = user::get_by_id(&self.pool, found.user_id).await?;
        if !account.is_active {
            return Err(Error::Unauthorized("user is deactivated".to_string()));
        }

        let token = self.issue_token(&account)?;
        let expires_at = Utc::now() + Duration::seconds(TOKEN_TTL_SECS);
        session::update_token(&self.pool, found.id, &hash_token(&token), expires_at).await?;

        Ok(RefreshResponse {
            token,
            expires_in: TOKEN_TTL_SECS,
        })
    }

    /// Keep-alive from the UI; refreshes the session's beacon stamp.
    pub async fn beacon(&self, token: &str) -> Result<()> {
        session::touch_beacon(&self.pool, &hash_token(token)).await
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        session::revoke(&self.pool, &hash_token(token)).await
    }

    fn issue_token(&self, account: &User) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: account.id.to_string(),
            role: account.role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(TOKEN_TTL_SECS)).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Internal(format!("sign token: {e}")))
    }
}

/// Validate a bearer token's signature and expiry.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| Error::Unauthorized(format!("invalid token: {e}")))
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Internal(format!("hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
        .is_ok()
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter2-but-long").unwrap();
        assert!(verify_password("hunter2-but-long", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn token_round_trip() {
        let now = Utc::now();
        let claims = Claims {
            sub: "4e0eff9d-2e44-4af3-9bd5-b2eab7b51b87".to_string(),
            role: "admin".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let decoded = decode_token(&token, "test-secret").unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.role, "admin");

        assert!(decode_token(&token, "other-secret").is_err());
    }
}
