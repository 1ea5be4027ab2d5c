//! Bearer-token authentication and the sync-surface shared secret.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use fleet_core::types::UserRole;
use fleet_core::{Error, Result};
use fleet_db::services::auth::decode_token;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, stored in request extensions by
/// `require_auth` and read by handlers via `Extension<AuthUser>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
    /// The raw bearer token; beacon and logout address the session by
    /// its hash.
    pub token: String,
}

impl AuthUser {
    /// Gate for fleet and configuration mutations.
    pub fn require_admin(&self) -> Result<()> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden("admin role required".to_string()))
        }
    }

    /// Gate for user deletion.
    pub fn require_root(&self) -> Result<()> {
        if self.role == UserRole::Root {
            Ok(())
        } else {
            Err(Error::Forbidden("root role required".to_string()))
        }
    }
}

fn bearer_token(request: &Request) -> Result<&str> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("authorization header is required".to_string()))?;
    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::Unauthorized("expected a bearer token".to_string()))
}

/// Validate the bearer token and expose the caller to handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let token = bearer_token(&request)?.to_string();
    let claims = decode_token(&token, &state.jwt_secret)?;

    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| Error::Unauthorized("malformed token subject".to_string()))?;
    let role = UserRole::parse(&claims.role)
        .ok_or_else(|| Error::Unauthorized("malformed token role".to_string()))?;

    request.extensions_mut().insert(AuthUser { id, role, token });
    Ok(next.run(request).await)
}

/// Optional shared secret on the sync surface. A no-op unless the
/// server was configured with one.
pub async fn require_sync_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    if let Some(expected) = &state.sync_secret {
        let presented = request
            .headers()
            .get("x-sync-secret")
            .and_then(|h| h.to_str().ok());
        if presented != Some(expected.as_str()) {
            return Err(Error::Unauthorized("invalid sync secret".to_string()).into());
        }
    }
    Ok(next.run(request).await)
}

/// Best-effort client address for audit rows and the registration
/// identity check, favoring proxy-injected headers.
pub fn client_ip(request_headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(forwarded) = request_headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    request_headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}
