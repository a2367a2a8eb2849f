// src/projects.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{parse_id, ApiJson, ApiQuery, ApiResponse};
use crate::app::AppState;
use crate::auth::{AuthUser, Permission};
use crate::error::AppError;
use crate::models::{Project, ProjectStatus, DEFAULT_PROJECT_COLOR};
use crate::store::ProjectFilter;
use crate::team_members::require_members;
use crate::validation::{check_color, check_required, Violations};

const RESOURCE: &str = "project";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
}

#[derive(Debug, Deserialize, Default)]
pub struct ProjectQuery {
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub client: String,
    pub color: Option<String>,
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub team_members: Vec<Uuid>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub client: Option<String>,
    pub color: Option<String>,
    pub status: Option<ProjectStatus>,
    pub team_members: Option<Vec<Uuid>>,
    pub description: Option<String>,
}

fn dedup_members(mut members: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    members.retain(|id| seen.insert(*id));
    members
}

/// Members see the projects they belong to; `ManageProjects` sees everything.
pub(crate) fn can_see_project(user: &AuthUser, project: &Project) -> bool {
    user.can(Permission::ManageProjects) || project.team_members.contains(&user.id)
}

pub(crate) async fn load_project(state: &AppState, raw_id: &str) -> Result<Project, AppError> {
    let id = parse_id(raw_id, RESOURCE)?;
    state
        .repo
        .get_project(id)
        .await?
        .ok_or(AppError::NotFound("Project"))
}

async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ProjectQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = ProjectFilter {
        status: query.status,
        member: (!user.can(Permission::ManageProjects)).then_some(user.id),
    };
    let projects = state.repo.list_projects(&filter).await?;
    Ok(Json(ApiResponse::list(projects)))
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateProjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Permission::ManageProjects)?;

    let color = req
        .color
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string());

    let mut v = Violations::new();
    check_required(&mut v, "Project name", &req.name);
    check_required(&mut v, "Client", &req.client);
    check_color(&mut v, &color);
    v.into_result()?;

    let team_members = dedup_members(req.team_members);
    require_members(&state, &team_members).await?;

    let now = Utc::now();
    let project = Project {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        client: req.client.trim().to_string(),
        color,
        status: req.status.unwrap_or_default(),
        team_members,
        description: req.description,
        created_at: now,
        updated_at: now,
    };

    state.repo.insert_project(&project).await?;
    info!("{} created project {} ({})", user.email, project.name, project.id);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(project).with_message("Project created successfully")),
    ))
}

async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let project = load_project(&state, &id).await?;
    if !can_see_project(&user, &project) {
        warn!("{} tried to view project {}", user.email, project.id);
        return Err(AppError::Forbidden(
            "You are not a member of this project".into(),
        ));
    }
    Ok(Json(ApiResponse::data(project)))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateProjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Permission::ManageProjects)?;
    let mut project = load_project(&state, &id).await?;

    let mut v = Violations::new();
    if let Some(name) = &req.name {
        check_required(&mut v, "Project name", name);
    }
    if let Some(client) = &req.client {
        check_required(&mut v, "Client", client);
    }
    if let Some(color) = &req.color {
        check_color(&mut v, color.trim());
    }
    v.into_result()?;

    if let Some(name) = req.name {
        project.name = name.trim().to_string();
    }
    if let Some(client) = req.client {
        project.client = client.trim().to_string();
    }
    if let Some(color) = req.color {
        project.color = color.trim().to_string();
    }
    if let Some(status) = req.status {
        project.status = status;
    }
    if let Some(members) = req.team_members {
        let members = dedup_members(members);
        require_members(&state, &members).await?;
        project.team_members = members;
    }
    if let Some(description) = req.description {
        project.description = Some(description);
    }
    project.updated_at = Utc::now();

    if !state.repo.update_project(&project).await? {
        return Err(AppError::NotFound("Project"));
    }
    info!("{} updated project {}", user.email, project.id);

    Ok(Json(
        ApiResponse::data(project).with_message("Project updated successfully"),
    ))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Permission::ManageProjects)?;
    let id = parse_id(&id, RESOURCE)?;

    if !state.repo.delete_project(id).await? {
        return Err(AppError::NotFound("Project"));
    }
    info!("{} deleted project {} and its tasks", user.email, id);

    Ok(Json(ApiResponse::message("Project deleted successfully")))
}
