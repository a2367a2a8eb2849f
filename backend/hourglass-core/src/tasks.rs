// src/tasks.rs
use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{parse_id, ApiJson, ApiQuery, ApiResponse};
use crate::app::AppState;
use crate::auth::{AuthUser, Permission};
use crate::error::AppError;
use crate::models::{Task, TaskStatus};
use crate::store::{ProjectFilter, TaskFilter};
use crate::team_members::require_members;
use crate::validation::{check_estimate, check_required, Violations};

const RESOURCE: &str = "task";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    pub project_id: Option<String>,
    pub assigned_to: Option<String>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<Uuid>,
    pub estimated_hours: Option<Decimal>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub status: Option<TaskStatus>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub estimated_hours: Option<Decimal>,
    pub project_id: Option<Uuid>,
}

impl UpdateTaskRequest {
    fn only_status(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.assigned_to.is_none()
            && self.estimated_hours.is_none()
            && self.project_id.is_none()
    }
}

fn optional_id(raw: Option<String>, resource: &'static str) -> Result<Option<Uuid>, AppError> {
    raw.filter(|r| !r.trim().is_empty())
        .map(|r| parse_id(r.trim(), resource))
        .transpose()
}

async fn require_project(state: &AppState, project_id: Uuid) -> Result<(), AppError> {
    match state.repo.get_project(project_id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound("Project")),
    }
}

/// Projects the user may see tasks for, or `None` when they see them all.
async fn visible_projects(
    state: &AppState,
    user: &AuthUser,
) -> Result<Option<HashSet<Uuid>>, AppError> {
    if user.can(Permission::ManageProjects) {
        return Ok(None);
    }
    let filter = ProjectFilter {
        status: None,
        member: Some(user.id),
    };
    let projects = state.repo.list_projects(&filter).await?;
    Ok(Some(projects.into_iter().map(|p| p.id).collect()))
}

fn task_visible(user: &AuthUser, visible: &Option<HashSet<Uuid>>, task: &Task) -> bool {
    match visible {
        None => true,
        Some(ids) => task.assigned_to == Some(user.id) || ids.contains(&task.project_id),
    }
}

async fn load_task(state: &AppState, raw_id: &str) -> Result<Task, AppError> {
    let id = parse_id(raw_id, RESOURCE)?;
    state
        .repo
        .get_task(id)
        .await?
        .ok_or(AppError::NotFound("Task"))
}

async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<TaskQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = TaskFilter {
        project_id: optional_id(query.project_id, "project")?,
        assigned_to: optional_id(query.assigned_to, "team member")?,
        status: query.status,
    };
    let visible = visible_projects(&state, &user).await?;
    let tasks: Vec<Task> = state
        .repo
        .list_tasks(&filter)
        .await?
        .into_iter()
        .filter(|t| task_visible(&user, &visible, t))
        .collect();
    Ok(Json(ApiResponse::list(tasks)))
}

async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Permission::ManageProjects)?;

    let Some(project_id) = req.project_id else {
        return Err(AppError::BadRequest("Missing required fields: projectId, name".into()));
    };

    let mut v = Violations::new();
    check_required(&mut v, "Task name", &req.name);
    check_estimate(&mut v, req.estimated_hours);
    v.into_result()?;

    require_project(&state, project_id).await?;
    if let Some(assignee) = req.assigned_to {
        require_members(&state, &[assignee]).await?;
    }

    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4(),
        project_id,
        name: req.name.trim().to_string(),
        description: req.description,
        status: req.status.unwrap_or_default(),
        assigned_to: req.assigned_to,
        estimated_hours: req.estimated_hours,
        created_at: now,
        updated_at: now,
    };

    state.repo.insert_task(&task).await?;
    info!("{} created task {} in project {}", user.email, task.id, project_id);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(task).with_message("Task created successfully")),
    ))
}

async fn get_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let task = load_task(&state, &id).await?;
    let visible = visible_projects(&state, &user).await?;
    if !task_visible(&user, &visible, &task) {
        warn!("{} tried to view task {}", user.email, task.id);
        return Err(AppError::Forbidden("Insufficient permissions".into()));
    }
    Ok(Json(ApiResponse::data(task)))
}

async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut task = load_task(&state, &id).await?;

    if !user.can(Permission::ManageProjects) {
        let is_assignee = task.assigned_to == Some(user.id);
        if !is_assignee || !req.only_status() {
            warn!("{} tried to modify task {}", user.email, task.id);
            return Err(AppError::Forbidden(
                "Only the assignee may update the status of this task".into(),
            ));
        }
    }

    let mut v = Violations::new();
    if let Some(name) = &req.name {
        check_required(&mut v, "Task name", name);
    }
    check_estimate(&mut v, req.estimated_hours);
    v.into_result()?;

    if let Some(project_id) = req.project_id {
        require_project(&state, project_id).await?;
        task.project_id = project_id;
    }
    if let Some(status) = req.status {
        task.status = status;
    }
    if let Some(name) = req.name {
        task.name = name.trim().to_string();
    }
    if let Some(description) = req.description {
        task.description = description;
    }
    if let Some(assignee) = req.assigned_to {
        require_members(&state, &[assignee]).await?;
        task.assigned_to = Some(assignee);
    }
    if let Some(estimate) = req.estimated_hours {
        task.estimated_hours = Some(estimate);
    }
    task.updated_at = Utc::now();

    if !state.repo.update_task(&task).await? {
        return Err(AppError::NotFound("Task"));
    }
    info!("{} updated task {} ({:?})", user.email, task.id, task.status);

    Ok(Json(ApiResponse::data(task).with_message("Task updated successfully")))
}

async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    user.require(Permission::ManageProjects)?;
    let id = parse_id(&id, RESOURCE)?;

    if !state.repo.delete_task(id).await? {
        return Err(AppError::NotFound("Task"));
    }
    info!("{} deleted task {}", user.email, id);

    Ok(Json(ApiResponse::message("Task deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_update_is_detected() {
        let req = UpdateTaskRequest {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        assert!(req.only_status());

        let req = UpdateTaskRequest {
            status: Some(TaskStatus::Completed),
            name: Some("Renamed".into()),
            ..Default::default()
        };
        assert!(!req.only_status());
    }

    #[test]
    fn blank_filter_ids_are_ignored() {
        assert_eq!(optional_id(Some("  ".into()), "project").unwrap(), None);
        assert!(optional_id(Some("nope".into()), "project").is_err());
    }
}
