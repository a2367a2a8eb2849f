// src/reports.rs
//! Hour totals derived from timesheets: summary, dashboard and CSV export.
use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{Datelike, Duration, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::api::{parse_id, ApiQuery, ApiResponse};
use crate::app::AppState;
use crate::auth::{AuthUser, Permission};
use crate::error::AppError;
use crate::models::Timesheet;
use crate::store::{MemberFilter, TimesheetFilter};
use crate::week::{
    month_start, next_month_start, parse_flexible_date, quarter_start, week_end_of,
    week_start_of, year_start,
};

const DAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const DAILY_TARGET_HOURS: u32 = 8;
const WEEKLY_CAPACITY_HOURS: u32 = 40;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/reports/summary", get(summary))
        .route("/api/reports/dashboard", get(dashboard))
        .route("/api/reports/export.csv", get(export))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuery {
    pub date: Option<String>,
    pub user_id: Option<String>,
}

//=============================================================================
// Report shapes
//=============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayTotal {
    pub day: &'static str,
    pub hours: Decimal,
    pub billable: Decimal,
    pub target: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthTotal {
    /// `YYYY-MM` of the week start.
    pub month: String,
    pub hours: Decimal,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberTotal {
    pub user_id: Uuid,
    pub name: String,
    pub hours: Decimal,
    pub timesheets: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_hours: Decimal,
    pub billable_hours: Decimal,
    pub hourly_rate: Decimal,
    pub revenue: Decimal,
    pub weekly: Vec<DayTotal>,
    pub monthly: Vec<MonthTotal>,
    pub team: Vec<MemberTotal>,
    pub status_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotal {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub hours: Decimal,
    pub timesheets: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTotals {
    pub week: PeriodTotal,
    pub month: PeriodTotal,
    pub quarter: PeriodTotal,
    pub year: PeriodTotal,
    /// Week hours as a whole percentage of a 40 hour week.
    pub week_utilization: Decimal,
}

/// One non-zero day of one timesheet.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DetailRow {
    pub date: NaiveDate,
    pub member: String,
    pub email: String,
    pub hours: Decimal,
    pub status: String,
    pub rate: Decimal,
}

//=============================================================================
// Aggregation
//=============================================================================

pub fn summarize(
    sheets: &[Timesheet],
    names: &HashMap<Uuid, String>,
    hourly_rate: Decimal,
) -> ReportSummary {
    let mut days = [Decimal::ZERO; 7];
    let mut months: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut team: BTreeMap<Uuid, (Decimal, usize)> = BTreeMap::new();
    let mut status_counts = BTreeMap::new();

    for sheet in sheets {
        for (slot, h) in days.iter_mut().zip(&sheet.hours) {
            *slot += *h;
        }
        let total = sheet.total_hours();
        *months
            .entry(sheet.week_start.format("%Y-%m").to_string())
            .or_default() += total;
        let member = team.entry(sheet.user_id).or_default();
        member.0 += total;
        member.1 += 1;
        *status_counts.entry(sheet.status.to_string()).or_insert(0) += 1;
    }

    let total_hours: Decimal = days.iter().copied().sum();

    let weekly = DAY_LABELS
        .into_iter()
        .zip(days)
        .map(|(day, hours)| DayTotal {
            day,
            hours,
            billable: hours,
            target: DAILY_TARGET_HOURS,
        })
        .collect();

    let monthly = months
        .into_iter()
        .map(|(month, hours)| MonthTotal {
            month,
            hours,
            revenue: hours * hourly_rate,
        })
        .collect();

    let mut team: Vec<MemberTotal> = team
        .into_iter()
        .map(|(user_id, (hours, timesheets))| MemberTotal {
            user_id,
            name: names
                .get(&user_id)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
            hours,
            timesheets,
        })
        .collect();
    team.sort_by(|a, b| b.hours.cmp(&a.hours).then_with(|| a.name.cmp(&b.name)));

    ReportSummary {
        total_hours,
        billable_hours: total_hours,
        hourly_rate,
        revenue: total_hours * hourly_rate,
        weekly,
        monthly,
        team,
        status_counts,
    }
}

fn period_total(sheets: &[Timesheet], start: NaiveDate, end: NaiveDate) -> PeriodTotal {
    let in_range: Vec<&Timesheet> = sheets
        .iter()
        .filter(|s| s.week_start >= start && s.week_start <= end)
        .collect();
    PeriodTotal {
        start,
        end,
        hours: in_range.iter().map(|s| s.total_hours()).sum(),
        timesheets: in_range.len(),
    }
}

/// Totals for the week, month, quarter and year containing `date`.
///
/// A sheet counts towards a period when its week starts inside it.
pub fn dashboard_totals(sheets: &[Timesheet], date: NaiveDate) -> Option<DashboardTotals> {
    let week_start = week_start_of(date);
    let month_first = month_start(date)?;
    let month_last = next_month_start(date)?.pred_opt()?;
    let quarter_first = quarter_start(date)?;
    let quarter_last = quarter_first.checked_add_months(Months::new(3))?.pred_opt()?;
    let year_first = year_start(date)?;
    let year_last = NaiveDate::from_ymd_opt(date.year(), 12, 31)?;

    let week = period_total(sheets, week_start, week_end_of(week_start));
    let week_utilization =
        (week.hours * Decimal::from(100) / Decimal::from(WEEKLY_CAPACITY_HOURS)).round();

    Some(DashboardTotals {
        week,
        month: period_total(sheets, month_first, month_last),
        quarter: period_total(sheets, quarter_first, quarter_last),
        year: period_total(sheets, year_first, year_last),
        week_utilization,
    })
}

/// Flattens sheets into dated rows, skipping days with no hours.
pub fn detailed_rows(
    sheets: &[Timesheet],
    members: &HashMap<Uuid, (String, String)>,
    hourly_rate: Decimal,
) -> Vec<DetailRow> {
    let mut rows = Vec::new();
    for sheet in sheets {
        let (member, email) = members
            .get(&sheet.user_id)
            .cloned()
            .unwrap_or_else(|| ("Unknown".to_string(), String::new()));
        for (offset, hours) in sheet.hours.iter().enumerate() {
            if hours.is_zero() {
                continue;
            }
            rows.push(DetailRow {
                date: sheet.week_start + Duration::days(offset as i64),
                member: member.clone(),
                email: email.clone(),
                hours: *hours,
                status: sheet.status.to_string(),
                rate: hourly_rate,
            });
        }
    }
    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.member.cmp(&b.member)));
    rows
}

pub fn export_csv(rows: &[DetailRow]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["date", "member", "email", "hours", "status", "rate"])?;
    for row in rows {
        writer.write_record([
            row.date.to_string(),
            row.member.clone(),
            row.email.clone(),
            row.hours.normalize().to_string(),
            row.status.clone(),
            row.rate.normalize().to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

//=============================================================================
// Handlers
//=============================================================================

/// Employees only ever report on themselves.
fn report_subject(user: &AuthUser, requested: Option<&str>) -> Result<Option<Uuid>, AppError> {
    let requested = match requested.map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => Some(parse_id(raw, "user")?),
        None => None,
    };
    if user.can(Permission::ViewReports) {
        Ok(requested)
    } else {
        Ok(Some(user.id))
    }
}

fn date_param(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => parse_flexible_date(raw)
            .map(Some)
            .ok_or_else(|| AppError::Validation(vec![format!("Invalid {} date: {}", field, raw)])),
        None => Ok(None),
    }
}

async fn sheets_for(
    state: &AppState,
    user: &AuthUser,
    query: &ReportQuery,
) -> Result<Vec<Timesheet>, AppError> {
    let filter = TimesheetFilter {
        user_id: report_subject(user, query.user_id.as_deref())?,
        status: None,
        week_start_from: date_param(query.from.as_deref(), "from")?,
        week_start_to: date_param(query.to.as_deref(), "to")?,
    };
    Ok(state.repo.list_timesheets(&filter).await?)
}

async fn member_directory(state: &AppState) -> Result<HashMap<Uuid, (String, String)>, AppError> {
    let members = state.repo.list_members(&MemberFilter::default()).await?;
    Ok(members
        .into_iter()
        .map(|m| (m.id, (m.name, m.email)))
        .collect())
}

async fn summary(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let sheets = sheets_for(&state, &user, &query).await?;
    let names = member_directory(&state)
        .await?
        .into_iter()
        .map(|(id, (name, _))| (id, name))
        .collect();

    let report = summarize(&sheets, &names, state.config.hourly_rate);
    Ok(Json(ApiResponse::data(report)))
}

async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let date = date_param(query.date.as_deref(), "dashboard")?
        .unwrap_or_else(|| Utc::now().date_naive());
    let year_first = year_start(date).ok_or_else(|| AppError::BadRequest("Date out of range".into()))?;

    // The week containing Jan 1 may start in the previous year.
    let filter = TimesheetFilter {
        user_id: report_subject(&user, query.user_id.as_deref())?,
        status: None,
        week_start_from: Some(week_start_of(year_first).min(week_start_of(date))),
        week_start_to: NaiveDate::from_ymd_opt(date.year(), 12, 31),
    };
    let sheets = state.repo.list_timesheets(&filter).await?;

    let totals = dashboard_totals(&sheets, date)
        .ok_or_else(|| AppError::BadRequest("Date out of range".into()))?;
    Ok(Json(ApiResponse::data(totals)))
}

async fn export(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let sheets = sheets_for(&state, &user, &query).await?;
    let members = member_directory(&state).await?;
    let rows = detailed_rows(&sheets, &members, state.config.hourly_rate);

    let body = export_csv(&rows).map_err(|e| {
        error!("Failed to write CSV report: {}", e);
        AppError::Internal(e.to_string())
    })?;
    info!("{} exported {} report row(s)", user.email, rows.len());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"time-report.csv\"",
            ),
        ],
        body,
    ))
}
