// src/auth.rs
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::app::AppState;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{Role, TeamMember};

pub const HASH_ROUNDS: u32 = 10_000;
pub const MIN_PASSWORD_LEN: usize = 8;
const SALT_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing or malformed authorization header")]
    MissingToken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account is not active")]
    InactiveAccount,
    #[error("Password must be at least 8 characters")]
    WeakPassword,
    #[error("Failed to issue token: {0}")]
    TokenIssue(#[from] jsonwebtoken::errors::Error),
    #[error("OAuth state validation failed")]
    OAuthStateMismatch,
    #[error("Authorization code not received")]
    MissingAuthCode,
    #[error("OAuth token exchange failed: {0}")]
    OAuthExchange(String),
    #[error("OAuth request failed: {0}")]
    Request(#[from] reqwest::Error),
}

//=============================================================================
// Passwords
//=============================================================================

fn digest(salt: &[u8], password: &str, rounds: u32) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let mut out = hasher.finalize();
    for _ in 1..rounds {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(out);
        out = hasher.finalize();
    }
    out.to_vec()
}

/// Hashes into `sha256$<rounds>$<salt-hex>$<hash-hex>`.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = digest(&salt, password, HASH_ROUNDS);
    Ok(format!(
        "sha256${}${}${}",
        HASH_ROUNDS,
        hex::encode(salt),
        hex::encode(hash)
    ))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some("sha256"), Some(rounds), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let (Ok(rounds), Ok(salt), Ok(expected)) =
        (rounds.parse::<u32>(), hex::decode(salt), hex::decode(hash))
    else {
        return false;
    };
    if rounds == 0 {
        return false;
    }
    let actual = digest(&salt, password, rounds);
    constant_time_eq(&actual, &expected)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

//=============================================================================
// Tokens
//=============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // member id
    pub email: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

pub fn issue_token(member: &TeamMember, config: &Config) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + chrono::Duration::hours(config.jwt_expiration_hours as i64);
    let claims = Claims {
        sub: member.id.to_string(),
        email: member.email.clone(),
        role: member.role,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret_bytes()),
    )?)
}

pub fn decode_token(token: &str, config: &Config) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::InvalidToken)
}

//=============================================================================
// Permissions
//=============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewTeam,
    ManageTeam,
    ManageProjects,
    ViewReports,
    ApproveTimesheets,
    ViewOwnTime,
    EditOwnTime,
    ViewAssignedProjects,
}

impl Permission {
    pub const ALL: [Permission; 8] = [
        Permission::ViewTeam,
        Permission::ManageTeam,
        Permission::ManageProjects,
        Permission::ViewReports,
        Permission::ApproveTimesheets,
        Permission::ViewOwnTime,
        Permission::EditOwnTime,
        Permission::ViewAssignedProjects,
    ];
}

impl Role {
    pub fn has_permission(&self, permission: Permission) -> bool {
        use Permission::*;
        match self {
            Role::Admin => true,
            Role::Manager => matches!(
                permission,
                ViewTeam | ManageProjects | ViewReports | ApproveTimesheets
            ),
            Role::Employee => matches!(
                permission,
                ViewOwnTime | EditOwnTime | ViewAssignedProjects
            ),
        }
    }

    pub fn permissions(&self) -> Vec<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|p| self.has_permission(*p))
            .collect()
    }
}

//=============================================================================
// Request identity
//=============================================================================

/// The signed-in member, placed in request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl AuthUser {
    pub fn can(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.can(permission) {
            Ok(())
        } else {
            warn!(
                "Member {} ({:?}) lacks permission {:?}",
                self.email, self.role, permission
            );
            Err(AppError::Forbidden("Insufficient permissions".into()))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves a bearer token to a live, active member.
pub async fn authenticate(state: &AppState, token: &str) -> Result<AuthUser, AppError> {
    let claims = decode_token(token, &state.config)?;
    let id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
    let member = state
        .repo
        .get_member(id)
        .await?
        .ok_or(AuthError::InvalidToken)?;
    if !member.is_active() {
        return Err(AuthError::InactiveAccount.into());
    }
    Ok(AuthUser {
        id: member.id,
        email: member.email,
        name: member.name,
        role: member.role,
    })
}

// Auth middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AuthError::MissingToken)?;
    let user = authenticate(&state, token).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Identity when a bearer token is present, `None` when it is absent.
pub async fn optional_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<AuthUser>, AppError> {
    match bearer_token(headers) {
        Some(token) => authenticate(state, token).await.map(Some),
        None => Ok(None),
    }
}

// Rate limit middleware
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .unwrap_or("unknown")
        .to_string();

    if state.limiter.check_key(&client_ip).is_err() {
        warn!("Rate limit exceeded for IP: {}", client_ip);
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}
