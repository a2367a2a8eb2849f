// src/team_members.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{parse_id, ApiJson, ApiQuery, ApiResponse};
use crate::app::AppState;
use crate::auth::{hash_password, AuthUser, Permission};
use crate::error::AppError;
use crate::models::{MemberStatus, Role, TeamMember};
use crate::store::{MemberFilter, Repository, DUPLICATE_EMAIL};
use crate::validation::{
    check_bio, check_email, check_member_name, check_required, normalize_email,
    normalize_skills, Violations,
};

const RESOURCE: &str = "team member";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/team-members", get(list_members).post(create_member))
        .route("/api/team-members/stats", get(member_stats))
        .route(
            "/api/team-members/{id}",
            get(get_member).put(update_member).delete(delete_member),
        )
}

#[derive(Debug, Deserialize, Default)]
pub struct MemberQuery {
    pub department: Option<String>,
    pub role: Option<Role>,
    pub status: Option<MemberStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub role: Option<Role>,
    pub status: Option<MemberStatus>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub skills: Option<Vec<String>>,
    pub bio: Option<String>,
    pub join_date: Option<DateTime<Utc>>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberRequest {
    // Profile fields, editable by the member themselves
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub skills: Option<Vec<String>>,
    pub bio: Option<String>,
    // Admin-only fields
    pub email: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub role: Option<Role>,
    pub status: Option<MemberStatus>,
    pub join_date: Option<DateTime<Utc>>,
}

impl UpdateMemberRequest {
    fn touches_admin_fields(&self) -> bool {
        self.email.is_some()
            || self.department.is_some()
            || self.position.is_some()
            || self.role.is_some()
            || self.status.is_some()
            || self.join_date.is_some()
    }
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct RoleCounts {
    pub admin: usize,
    pub manager: usize,
    pub employee: usize,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub inactive: usize,
    pub pending: usize,
}

/// Head counts for the team overview.
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStats {
    pub total: usize,
    pub by_role: RoleCounts,
    pub by_status: StatusCounts,
    pub by_department: BTreeMap<String, usize>,
}

pub fn team_stats(members: &[TeamMember]) -> TeamStats {
    let mut stats = TeamStats {
        total: members.len(),
        ..Default::default()
    };
    for member in members {
        match member.role {
            Role::Admin => stats.by_role.admin += 1,
            Role::Manager => stats.by_role.manager += 1,
            Role::Employee => stats.by_role.employee += 1,
        }
        match member.status {
            MemberStatus::Active => stats.by_status.active += 1,
            MemberStatus::Inactive => stats.by_status.inactive += 1,
            MemberStatus::Pending => stats.by_status.pending += 1,
        }
        *stats
            .by_department
            .entry(member.department.clone())
            .or_default() += 1;
    }
    stats
}

/// Fails with `NotFound` for the first id that names no team member.
pub(crate) async fn require_members(
    state: &AppState,
    ids: &[Uuid],
) -> Result<(), AppError> {
    for id in ids {
        if state.repo.get_member(*id).await?.is_none() {
            warn!("Reference to unknown team member {}", id);
            return Err(AppError::NotFound("Team member"));
        }
    }
    Ok(())
}

/// Writes `member` back, treating a vanished row as `NotFound`.
pub(crate) async fn save_member(
    repo: &dyn Repository,
    member: &TeamMember,
) -> Result<(), AppError> {
    if repo.update_member(member).await? {
        Ok(())
    } else {
        Err(AppError::NotFound("Team member"))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<MemberQuery>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Permission::ViewTeam)?;

    let filter = MemberFilter {
        department: non_blank(query.department),
        role: query.role,
        status: query.status,
        search: non_blank(query.search),
    };
    let members = state.repo.list_members(&filter).await?;
    Ok(Json(ApiResponse::list(members)))
}

async fn member_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    user.require(Permission::ViewTeam)?;
    let members = state.repo.list_members(&MemberFilter::default()).await?;
    Ok(Json(ApiResponse::data(team_stats(&members))))
}

async fn create_member(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Permission::ManageTeam)?;

    let (Some(name), Some(email), Some(department), Some(position)) = (
        non_blank(req.name),
        non_blank(req.email),
        non_blank(req.department),
        non_blank(req.position),
    ) else {
        return Err(AppError::BadRequest(
            "Missing required fields: name, email, department, position".into(),
        ));
    };

    let mut v = Violations::new();
    check_member_name(&mut v, &name);
    check_email(&mut v, &email);
    check_bio(&mut v, req.bio.as_deref());
    v.into_result()?;

    let email = normalize_email(&email);
    if state.repo.find_member_by_email(&email).await?.is_some() {
        warn!("Rejected team member with existing email {}", email);
        return Err(AppError::Duplicate(DUPLICATE_EMAIL.into()));
    }

    let mut member = TeamMember::new(name, email, department, position);
    member.role = req.role.unwrap_or_default();
    member.status = req.status.unwrap_or_default();
    member.avatar = req.avatar;
    member.phone = req.phone;
    member.location = req.location;
    member.skills = normalize_skills(req.skills.unwrap_or_default());
    member.bio = req.bio;
    if let Some(join_date) = req.join_date {
        member.join_date = join_date;
    }
    if let Some(password) = req.password.filter(|p| !p.is_empty()) {
        member.password_hash = Some(hash_password(&password)?);
    }

    state.repo.insert_member(&member).await?;
    info!("{} created team member {}", user.email, member.email);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(member).with_message("Team member created successfully")),
    ))
}

async fn get_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, RESOURCE)?;
    if id != user.id {
        user.require(Permission::ViewTeam)?;
    }
    let member = state
        .repo
        .get_member(id)
        .await?
        .ok_or(AppError::NotFound("Team member"))?;
    Ok(Json(ApiResponse::data(member)))
}

async fn update_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id, RESOURCE)?;
    let is_manager_of_team = user.can(Permission::ManageTeam);
    if !is_manager_of_team {
        if id != user.id {
            warn!("{} tried to update another member's profile", user.email);
            return Err(AppError::Forbidden("Insufficient permissions".into()));
        }
        if req.touches_admin_fields() {
            warn!("{} tried to change restricted profile fields", user.email);
            return Err(AppError::Forbidden(
                "Only administrators can change email, department, position, role or status"
                    .into(),
            ));
        }
    }

    let mut member = state
        .repo
        .get_member(id)
        .await?
        .ok_or(AppError::NotFound("Team member"))?;

    let mut v = Violations::new();
    if let Some(name) = &req.name {
        check_member_name(&mut v, name);
    }
    if let Some(email) = &req.email {
        check_email(&mut v, email);
    }
    if let Some(department) = &req.department {
        check_required(&mut v, "Department", department);
    }
    if let Some(position) = &req.position {
        check_required(&mut v, "Position", position);
    }
    check_bio(&mut v, req.bio.as_deref());
    v.into_result()?;

    if let Some(email) = req.email {
        let email = normalize_email(&email);
        if let Some(existing) = state.repo.find_member_by_email(&email).await? {
            if existing.id != member.id {
                return Err(AppError::Duplicate(DUPLICATE_EMAIL.into()));
            }
        }
        member.email = email;
    }
    if let Some(name) = req.name {
        member.name = name.trim().to_string();
    }
    if let Some(avatar) = req.avatar {
        member.avatar = Some(avatar);
    }
    if let Some(phone) = req.phone {
        member.phone = Some(phone);
    }
    if let Some(location) = req.location {
        member.location = Some(location);
    }
    if let Some(skills) = req.skills {
        member.skills = normalize_skills(skills);
    }
    if let Some(bio) = req.bio {
        member.bio = Some(bio);
    }
    if let Some(department) = req.department {
        member.department = department.trim().to_string();
    }
    if let Some(position) = req.position {
        member.position = position.trim().to_string();
    }
    if let Some(role) = req.role {
        member.role = role;
    }
    if let Some(status) = req.status {
        member.status = status;
    }
    if let Some(join_date) = req.join_date {
        member.join_date = join_date;
    }
    member.updated_at = Utc::now();

    save_member(state.repo.as_ref(), &member).await?;
    info!("{} updated team member {}", user.email, member.email);

    Ok(Json(
        ApiResponse::data(member).with_message("Team member updated successfully"),
    ))
}

async fn delete_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Permission::ManageTeam)?;
    let id = parse_id(&id, RESOURCE)?;
    if id == user.id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".into(),
        ));
    }

    if !state.repo.delete_member(id).await? {
        return Err(AppError::NotFound("Team member"));
    }
    info!("{} deleted team member {}", user.email, id);

    Ok(Json(ApiResponse::message("Team member deleted successfully")))
}
