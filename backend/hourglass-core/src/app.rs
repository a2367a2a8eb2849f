// src/app.rs
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{middleware, response::IntoResponse, routing::get, Json, Router};
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use reqwest::Client;
use tower_http::trace::TraceLayer;

use crate::aircall::AircallClient;
use crate::auth::{auth_middleware, rate_limit_middleware};
use crate::config::Config;
use crate::google_oauth::OAuthStates;
use crate::presence::Presence;
use crate::store::Repository;
use crate::{
    auth_routes, kpi, presence, projects, reports, setup_admin, tasks, team_members,
    time_entries,
};

pub type KeyedLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repo: Arc<dyn Repository>,
    pub limiter: Arc<KeyedLimiter>,
    pub http_client: Client,
    pub oauth_states: Arc<OAuthStates>,
    pub presence: Arc<Presence>,
    pub aircall: Option<Arc<AircallClient>>,
}

impl AppState {
    pub fn new(config: Config, repo: Arc<dyn Repository>) -> Self {
        let per_minute = NonZeroU32::new(config.rate_limit_requests).unwrap_or(NonZeroU32::MIN);
        let http_client = Client::new();
        let aircall = config
            .aircall()
            .map(|settings| Arc::new(AircallClient::new(http_client.clone(), settings)));

        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            presence: Arc::new(Presence::new(config.presence_ttl_secs)),
            oauth_states: Arc::new(OAuthStates::default()),
            http_client,
            aircall,
            repo,
            config: Arc::new(config),
        }
    }

    /// Optional integrations that are switched on, for the health report.
    pub fn features(&self) -> Vec<&'static str> {
        let mut features = vec!["authentication", "timesheets", "projects", "reports", "kpi"];
        if self.config.database_url().is_some() {
            features.push("database");
        } else {
            features.push("memory_store");
        }
        if self.config.google().is_some() {
            features.push("google_oauth");
        }
        if self.aircall.is_some() {
            features.push("aircall_sync");
        }
        features
    }
}

async fn health_check(state: axum::extract::State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "features": state.features(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub fn build_router(state: AppState) -> Router {
    let public_router = Router::new()
        .route("/", get(|| async { "Hourglass API" }))
        .route("/health", get(health_check))
        .merge(auth_routes::public_routes())
        .merge(setup_admin::routes());

    let protected_router = Router::new()
        .merge(auth_routes::protected_routes())
        .merge(team_members::routes())
        .merge(time_entries::routes())
        .merge(projects::routes())
        .merge(tasks::routes())
        .merge(reports::routes())
        .merge(kpi::routes())
        .merge(presence::routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    public_router
        .merge(protected_router)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
