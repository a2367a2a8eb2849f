// src/auth_routes.rs
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{ApiJson, ApiResponse};
use crate::app::AppState;
use crate::auth::{hash_password, issue_token, verify_password, AuthError, AuthUser, Permission};
use crate::error::AppError;
use crate::google_oauth;
use crate::models::TeamMember;
use crate::team_members::save_member;
use crate::validation::{check_email, check_member_name, normalize_email, Violations};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/google", get(google_oauth::google_auth_redirect))
        .route(
            "/api/auth/google/callback",
            get(google_oauth::google_auth_callback),
        )
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/password", put(change_password))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub company: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: String,
}

/// Token plus the member it was issued for.
#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub success: bool,
    pub token: String,
    pub user: TeamMember,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub member: TeamMember,
    pub permissions: Vec<Permission>,
}

pub(crate) fn auth_payload(state: &AppState, member: TeamMember) -> Result<AuthPayload, AppError> {
    let token = issue_token(&member, &state.config)?;
    Ok(AuthPayload {
        success: true,
        token,
        user: member,
    })
}

async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut v = Violations::new();
    check_member_name(&mut v, &req.name);
    check_email(&mut v, &req.email);
    v.into_result()?;

    let password_hash = hash_password(&req.password)?;
    let department = req
        .company
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("Unassigned")
        .to_string();

    let mut member = TeamMember::new(
        req.name.trim().to_string(),
        normalize_email(&req.email),
        department,
        "Employee".to_string(),
    );
    member.password_hash = Some(password_hash);

    state.repo.insert_member(&member).await?;
    info!("Registered new member {}", member.email);

    let payload = auth_payload(&state, member)?;
    Ok((StatusCode::CREATED, Json(payload)))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Email and password are required".into(),
        ));
    }

    let email = normalize_email(&req.email);
    let member = state
        .repo
        .find_member_by_email(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let valid = member
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(&req.password, hash));
    if !valid {
        warn!("Failed login attempt for {}", email);
        return Err(AuthError::InvalidCredentials.into());
    }
    if !member.is_active() {
        warn!("Login refused for non-active member {}", email);
        return Err(AuthError::InactiveAccount.into());
    }

    info!("Member {} logged in", email);
    Ok(Json(auth_payload(&state, member)?))
}

async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let member = state
        .repo
        .get_member(user.id)
        .await?
        .ok_or(AppError::NotFound("Team member"))?;
    let permissions = member.role.permissions();
    Ok(Json(ApiResponse::data(MeResponse {
        member,
        permissions,
    })))
}

async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut member = state
        .repo
        .get_member(user.id)
        .await?
        .ok_or(AppError::NotFound("Team member"))?;

    // Google-only accounts have no current password to confirm
    if let Some(existing) = member.password_hash.as_deref() {
        let confirmed = req
            .current_password
            .as_deref()
            .is_some_and(|current| verify_password(current, existing));
        if !confirmed {
            warn!("Password change for {} with wrong current password", user.email);
            return Err(AuthError::InvalidCredentials.into());
        }
    }

    member.password_hash = Some(hash_password(&req.new_password)?);
    member.updated_at = Utc::now();
    save_member(state.repo.as_ref(), &member).await?;
    info!("Member {} changed their password", user.email);

    Ok(Json(ApiResponse::message("Password updated")))
}
