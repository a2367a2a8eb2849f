// src/setup_admin.rs
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::ApiResponse;
use crate::app::AppState;
use crate::auth::optional_user;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{MemberStatus, Role, TeamMember};
use crate::store::{MemberFilter, Repository};
use crate::team_members::save_member;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/setup-admin", get(admin_status).post(setup_admin))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatus {
    pub success: bool,
    pub exists: bool,
    pub is_admin: bool,
    pub data: Option<TeamMember>,
}

#[derive(Debug)]
pub enum AdminSetup {
    Created(TeamMember),
    Updated(TeamMember),
}

fn configured_email(config: &Config) -> Result<String, AppError> {
    config
        .setup_admin_email()
        .ok_or(AppError::Unavailable("Admin setup"))
}

/// Creates the configured administrator, or promotes the existing record.
pub async fn ensure_admin(repo: &dyn Repository, config: &Config) -> Result<AdminSetup, AppError> {
    let email = configured_email(config)?;

    if let Some(mut member) = repo.find_member_by_email(&email).await? {
        member.role = Role::Admin;
        member.status = MemberStatus::Active;
        member.department = config.setup_admin_department.clone();
        member.position = config.setup_admin_position.clone();
        member.is_google_user = true;
        member.updated_at = Utc::now();
        save_member(repo, &member).await?;
        info!("Promoted {} to administrator", member.email);
        return Ok(AdminSetup::Updated(member));
    }

    let mut member = TeamMember::new(
        config.setup_admin_name.clone(),
        email,
        config.setup_admin_department.clone(),
        config.setup_admin_position.clone(),
    );
    member.role = Role::Admin;
    member.status = MemberStatus::Active;
    member.is_google_user = true;
    member.skills = vec!["Leadership".into(), "Management".into()];
    repo.insert_member(&member).await?;
    info!("Created administrator {}", member.email);
    Ok(AdminSetup::Created(member))
}

async fn any_admin_exists(repo: &dyn Repository) -> Result<bool, AppError> {
    let filter = MemberFilter {
        role: Some(Role::Admin),
        ..Default::default()
    };
    Ok(!repo.list_members(&filter).await?.is_empty())
}

async fn admin_status(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let email = configured_email(&state.config)?;
    let admin = state.repo.find_member_by_email(&email).await?;

    Ok(Json(AdminStatus {
        success: true,
        exists: admin.is_some(),
        is_admin: admin.as_ref().is_some_and(|m| m.role == Role::Admin),
        data: admin,
    }))
}

async fn setup_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if any_admin_exists(state.repo.as_ref()).await? {
        match optional_user(&state, &headers).await? {
            Some(user) if user.is_admin() => {}
            Some(user) => {
                warn!("{} attempted admin setup without admin role", user.email);
                return Err(AppError::Forbidden(
                    "An administrator already exists".into(),
                ));
            }
            None => return Err(AppError::Unauthorized),
        }
    }

    Ok(match ensure_admin(state.repo.as_ref(), &state.config).await? {
        AdminSetup::Created(member) => (
            StatusCode::CREATED,
            Json(ApiResponse::data(member).with_message("Default admin user created successfully")),
        ),
        AdminSetup::Updated(member) => (
            StatusCode::OK,
            Json(ApiResponse::data(member).with_message("Admin user updated successfully")),
        ),
    })
}
