// src/time_entries.rs
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{parse_id, ApiJson, ApiQuery, ApiResponse};
use crate::app::AppState;
use crate::auth::{AuthUser, Permission};
use crate::error::AppError;
use crate::models::{Timesheet, TimesheetStatus};
use crate::store::TimesheetFilter;
use crate::timesheet::{action_towards, TimesheetAction};
use crate::validation::{check_hours, check_notes, check_week, parse_hours, Violations};
use crate::week::{parse_flexible_date, week_start_of};

const RESOURCE: &str = "time entry";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/time-entries", get(list_entries).post(create_entry))
        .route("/api/time-entries/week", get(entry_for_week))
        .route(
            "/api/time-entries/{id}",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
        .route("/api/time-entries/{id}/{action}", post(transition_entry))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EntryQuery {
    pub user_id: Option<String>,
    pub status: Option<TimesheetStatus>,
    pub week_start: Option<String>,
    pub week_end: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekQuery {
    pub date: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    pub user_id: Option<String>,
    pub week_start: Option<String>,
    pub week_end: Option<String>,
    pub hours: Option<Value>,
    pub notes: Option<String>,
    pub status: Option<TimesheetStatus>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryRequest {
    pub hours: Option<Value>,
    pub notes: Option<String>,
    pub status: Option<TimesheetStatus>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TransitionRequest {
    pub reason: Option<String>,
}

fn parse_date_param(raw: &str, field: &str) -> Result<NaiveDate, AppError> {
    parse_flexible_date(raw)
        .ok_or_else(|| AppError::Validation(vec![format!("Invalid {} date: {}", field, raw)]))
}

fn optional_date_param(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    raw.filter(|r| !r.trim().is_empty())
        .map(|r| parse_date_param(r, field))
        .transpose()
}

/// Owners see their own sheets; anyone with `ViewTeam` sees all.
fn ensure_can_view(user: &AuthUser, sheet: &Timesheet) -> Result<(), AppError> {
    if sheet.user_id == user.id || user.can(Permission::ViewTeam) {
        Ok(())
    } else {
        warn!("{} tried to access time entry {}", user.email, sheet.id);
        Err(AppError::Forbidden(
            "You can only access your own time entries".into(),
        ))
    }
}

/// Reviews need `ApproveTimesheets` and never target the reviewer's own sheet
/// (admins excepted); submit and withdraw belong to the owner.
fn authorize_action(
    user: &AuthUser,
    sheet: &Timesheet,
    action: TimesheetAction,
) -> Result<(), AppError> {
    if action.is_review() {
        user.require(Permission::ApproveTimesheets)?;
        if sheet.user_id == user.id && !user.is_admin() {
            warn!("{} tried to {} their own time entry", user.email, action);
            return Err(AppError::Forbidden(
                "You cannot review your own time entry".into(),
            ));
        }
    } else if sheet.user_id != user.id && !user.is_admin() {
        warn!("{} tried to {} time entry {}", user.email, action, sheet.id);
        return Err(AppError::Forbidden(
            "Only the owner can submit or withdraw a time entry".into(),
        ));
    }
    Ok(())
}

async fn load_entry(state: &AppState, raw_id: &str) -> Result<Timesheet, AppError> {
    let id = parse_id(raw_id, RESOURCE)?;
    state
        .repo
        .get_timesheet(id)
        .await?
        .ok_or(AppError::NotFound("Time entry"))
}

async fn list_entries(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<EntryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let requested_user = match query.user_id.as_deref().filter(|u| !u.is_empty()) {
        Some(raw) => Some(parse_id(raw, "user")?),
        None => None,
    };
    let user_id = if user.can(Permission::ViewTeam) {
        requested_user
    } else {
        Some(user.id)
    };

    let filter = TimesheetFilter {
        user_id,
        status: query.status,
        week_start_from: optional_date_param(query.week_start.as_deref(), "weekStart")?,
        week_start_to: optional_date_param(query.week_end.as_deref(), "weekEnd")?,
    };
    let sheets = state.repo.list_timesheets(&filter).await?;
    Ok(Json(ApiResponse::list(sheets)))
}

async fn create_entry(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(week_start_raw), Some(hours_raw)) = (
        req.week_start.as_deref().filter(|w| !w.trim().is_empty()),
        req.hours.as_ref(),
    ) else {
        return Err(AppError::BadRequest(
            "Missing required fields: weekStart, hours".into(),
        ));
    };
    let hours = parse_hours(hours_raw).map_err(AppError::BadRequest)?;

    let owner = match req.user_id.as_deref().filter(|u| !u.is_empty()) {
        Some(raw) => parse_id(raw, "user")?,
        None => user.id,
    };
    if owner != user.id {
        user.require(Permission::ViewTeam)?;
        if state.repo.get_member(owner).await?.is_none() {
            return Err(AppError::NotFound("Team member"));
        }
    }

    let status = req.status.unwrap_or_default();
    if !matches!(status, TimesheetStatus::Draft | TimesheetStatus::Submitted) {
        return Err(AppError::BadRequest(
            "New time entries must be draft or submitted".into(),
        ));
    }

    let week_start = parse_date_param(week_start_raw, "weekStart")?;
    let week_end = optional_date_param(req.week_end.as_deref(), "weekEnd")?;
    let notes = req.notes.unwrap_or_default();

    let mut v = Violations::new();
    let week_end = check_week(&mut v, week_start, week_end);
    check_hours(&mut v, &hours);
    check_notes(&mut v, &notes);
    v.into_result()?;

    let mut sheet = Timesheet::new(owner, week_start, hours, notes);
    sheet.week_end = week_end;
    if status == TimesheetStatus::Submitted {
        sheet.apply(TimesheetAction::Submit, user.id, None, Utc::now())?;
    }

    state.repo.insert_timesheet(&sheet).await?;
    info!(
        "{} created {} time entry for week {} (member {})",
        user.email, sheet.status, sheet.week_start, sheet.user_id
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(sheet).with_message("Time entry created successfully")),
    ))
}

async fn entry_for_week(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<WeekQuery>,
) -> Result<impl IntoResponse, AppError> {
    let date = match query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => parse_date_param(raw, "date")?,
        None => Utc::now().date_naive(),
    };
    let owner = match query.user_id.as_deref().filter(|u| !u.is_empty()) {
        Some(raw) => parse_id(raw, "user")?,
        None => user.id,
    };
    if owner != user.id {
        user.require(Permission::ViewTeam)?;
    }

    let sheet = state
        .repo
        .find_timesheet(owner, week_start_of(date))
        .await?
        .ok_or(AppError::NotFound("Time entry"))?;
    Ok(Json(ApiResponse::data(sheet)))
}

async fn get_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let sheet = load_entry(&state, &id).await?;
    ensure_can_view(&user, &sheet)?;
    Ok(Json(ApiResponse::data(sheet)))
}

async fn update_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut sheet = load_entry(&state, &id).await?;
    ensure_can_view(&user, &sheet)?;

    let hours = req
        .hours
        .as_ref()
        .map(parse_hours)
        .transpose()
        .map_err(AppError::BadRequest)?;

    if hours.is_some() || req.notes.is_some() {
        if !sheet.status.is_editable() {
            return Err(AppError::Conflict(format!(
                "Cannot edit a time entry that is {}",
                sheet.status
            )));
        }
        let mut v = Violations::new();
        if let Some(hours) = &hours {
            check_hours(&mut v, hours);
        }
        if let Some(notes) = &req.notes {
            check_notes(&mut v, notes);
        }
        v.into_result()?;

        if let Some(hours) = hours {
            sheet.hours = hours;
        }
        if let Some(notes) = req.notes {
            sheet.notes = notes;
        }
    }

    let now = Utc::now();
    if let Some(target) = req.status {
        if !matches!(target, TimesheetStatus::Draft | TimesheetStatus::Submitted) {
            return Err(AppError::BadRequest(
                "Use the approve or reject action to review a time entry".into(),
            ));
        }
        if let Some(action) = action_towards(sheet.status, target)? {
            authorize_action(&user, &sheet, action)?;
            sheet.apply(action, user.id, None, now)?;
        }
    }
    sheet.updated_at = now;

    if !state.repo.update_timesheet(&sheet).await? {
        return Err(AppError::NotFound("Time entry"));
    }
    info!("{} updated time entry {}", user.email, sheet.id);

    Ok(Json(
        ApiResponse::data(sheet).with_message("Time entry updated successfully"),
    ))
}

fn past_tense(action: TimesheetAction) -> &'static str {
    match action {
        TimesheetAction::Submit => "submitted",
        TimesheetAction::Withdraw => "withdrawn",
        TimesheetAction::Approve => "approved",
        TimesheetAction::Reject => "rejected",
        TimesheetAction::Reopen => "reopened",
    }
}

async fn transition_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, action)): Path<(String, String)>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let action: TimesheetAction = action
        .parse()
        .map_err(|e: crate::timesheet::UnknownAction| AppError::BadRequest(e.to_string()))?;
    let req: TransitionRequest = if body.is_empty() {
        TransitionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?
    };

    let mut sheet = load_entry(&state, &id).await?;
    ensure_can_view(&user, &sheet)?;
    authorize_action(&user, &sheet, action)?;

    sheet.apply(action, user.id, req.reason, Utc::now())?;
    if !state.repo.update_timesheet(&sheet).await? {
        return Err(AppError::NotFound("Time entry"));
    }
    info!(
        "{} {} time entry {} (week {})",
        user.email,
        past_tense(action),
        sheet.id,
        sheet.week_start
    );

    let message = format!("Time entry {}", past_tense(action));
    Ok(Json(ApiResponse::data(sheet).with_message(message)))
}

async fn delete_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let sheet = load_entry(&state, &id).await?;
    if sheet.user_id != user.id && !user.is_admin() {
        warn!("{} tried to delete time entry {}", user.email, sheet.id);
        return Err(AppError::Forbidden(
            "You can only delete your own time entries".into(),
        ));
    }
    if sheet.status == TimesheetStatus::Approved && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Approved time entries can only be deleted by an administrator".into(),
        ));
    }

    let id: Uuid = sheet.id;
    if !state.repo.delete_timesheet(id).await? {
        return Err(AppError::NotFound("Time entry"));
    }
    info!("{} deleted time entry {}", user.email, id);

    Ok(Json(ApiResponse::message("Time entry deleted successfully")))
}
