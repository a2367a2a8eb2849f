// src/kpi.rs
use std::time::Duration;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, info};

use crate::api::{ApiJson, ApiQuery};
use crate::app::AppState;
use crate::auth::{AuthUser, Permission};
use crate::error::AppError;
use crate::models::{CallRecord, ChartPoint, KpiTotals};
use crate::store::Repository;
use crate::week::{parse_flexible_datetime, Period};

const RETENTION_SWEEP: Duration = Duration::from_secs(60);

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/kpi/stats", get(stats))
        .route("/api/kpi/calls", post(ingest_calls))
        .route("/api/kpi/sync", post(sync_from_aircall))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub period: Option<String>,
    pub user_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub kpis: KpiTotals,
    pub chart_data: Vec<ChartPoint>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub calls: Vec<CallRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub success: bool,
    pub received: usize,
    pub recorded: usize,
    pub duplicates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// Managers and admins only
fn require_reviewer(user: &AuthUser) -> Result<(), AppError> {
    user.require(Permission::ViewReports)
}

async fn stats(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiQuery(query): ApiQuery<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let at = match query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => parse_flexible_datetime(raw)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid date: {}", raw)))?,
        None => Utc::now(),
    };
    let period = Period::parse(query.period.as_deref());
    let range = period
        .range_around(at)
        .ok_or_else(|| AppError::BadRequest("Date out of range".into()))?;
    let user_id = query.user_id.as_deref().filter(|u| !u.is_empty());

    let kpis = state.repo.call_totals(range, user_id).await?;
    let chart_data = state.repo.call_series(range, user_id).await?;

    Ok(Json(StatsResponse { kpis, chart_data }))
}

/// Records each call, counting how many were new.
pub async fn ingest(repo: &dyn Repository, calls: &[CallRecord]) -> Result<usize, AppError> {
    let mut recorded = 0;
    for call in calls {
        if repo.record_call(call).await? {
            recorded += 1;
        }
    }
    Ok(recorded)
}

async fn ingest_calls(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<IngestRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_reviewer(&user)?;

    let recorded = ingest(state.repo.as_ref(), &req.calls).await?;
    info!(
        "{} ingested {} call(s), {} new",
        user.email,
        req.calls.len(),
        recorded
    );

    Ok(Json(IngestSummary {
        success: true,
        received: req.calls.len(),
        recorded,
        duplicates: req.calls.len() - recorded,
        message: None,
    }))
}

async fn sync_from_aircall(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    require_reviewer(&user)?;
    let client = state
        .aircall
        .clone()
        .ok_or(AppError::Unavailable("Aircall sync"))?;

    let to = Utc::now();
    let from = to - chrono::Duration::hours(1);
    let calls = client.calls_between(from, to).await?;
    let recorded = ingest(state.repo.as_ref(), &calls).await?;

    info!("Manual sync triggered by {}: {} new call(s)", user.email, recorded);
    Ok(Json(IngestSummary {
        success: true,
        received: calls.len(),
        recorded,
        duplicates: calls.len() - recorded,
        message: Some("Data sync completed successfully.".into()),
    }))
}

/// Drops expired call buckets and idle rate-limit keys.
async fn sweep(state: &AppState) {
    let cutoff = Utc::now() - chrono::Duration::minutes(state.config.kpi_retention_minutes);
    match state.repo.purge_call_stats(cutoff).await {
        Ok(0) => {}
        Ok(removed) => info!("Purged {} expired call stat bucket(s)", removed),
        Err(e) => error!("Failed to purge call stats: {}", e),
    }
    state.limiter.retain_recent();
}

/// Runs [`sweep`] once a minute.
pub fn spawn_retention_task(state: AppState) {
    tokio::spawn(async move {
        info!(
            "Starting call stats retention task ({} minute window)",
            state.config.kpi_retention_minutes
        );
        loop {
            sleep(RETENTION_SWEEP).await;
            sweep(&state).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CallDirection;
    use crate::test_support::{test_config, TestApp};

    #[tokio::test]
    async fn sweep_purges_expired_buckets_and_keeps_active_clients() {
        let mut config = test_config();
        config.kpi_retention_minutes = 0;
        let app = TestApp::with_config(config);

        let call = CallRecord {
            id: "c-1".into(),
            user_id: "agent-1".into(),
            name: None,
            started_at: Utc::now(),
            duration_seconds: 60,
            direction: CallDirection::Outbound,
        };
        assert!(app.state.repo.record_call(&call).await.unwrap());
        assert!(app.state.limiter.check_key(&"10.0.0.1".to_string()).is_ok());

        sleep(Duration::from_millis(5)).await;
        sweep(&app.state).await;

        let far_future = Utc::now() + chrono::Duration::days(1);
        assert_eq!(app.state.repo.purge_call_stats(far_future).await.unwrap(), 0);
        assert_eq!(app.state.limiter.len(), 1);
    }
}
