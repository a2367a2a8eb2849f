// src/presence.rs
use std::collections::HashMap;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::ApiJson;
use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::validation::normalize_email;

/// Who has pinged recently, keyed by email.
pub struct Presence {
    ttl: Duration,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Presence {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs.max(1)),
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub async fn mark_online(&self, email: &str, now: DateTime<Utc>) {
        self.seen.lock().await.insert(email.to_string(), now);
    }

    pub async fn mark_offline(&self, email: &str) {
        self.seen.lock().await.remove(email);
    }

    /// Emails seen within the TTL, sorted. Stale entries are dropped.
    pub async fn online(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut seen = self.seen.lock().await;
        let cutoff = now - self.ttl;
        seen.retain(|_, last| *last >= cutoff);
        let mut users: Vec<String> = seen.keys().cloned().collect();
        users.sort();
        users
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/api/online-users",
        get(list_online).post(mark_online).delete(mark_offline),
    )
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OnlineUsers {
    pub success: bool,
    pub users: Vec<String>,
}

fn required_email(req: PresenceRequest) -> Result<String, AppError> {
    req.email
        .map(|e| normalize_email(&e))
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing email".into()))
}

async fn list_online(State(state): State<AppState>, _user: AuthUser) -> impl IntoResponse {
    let users = state.presence.online(Utc::now()).await;
    Json(OnlineUsers {
        success: true,
        users,
    })
}

async fn mark_online(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiJson(req): ApiJson<PresenceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = required_email(req)?;
    debug!("{} is online", email);
    state.presence.mark_online(&email, Utc::now()).await;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn mark_offline(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiJson(req): ApiJson<PresenceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = required_email(req)?;
    debug!("{} went offline", email);
    state.presence.mark_offline(&email).await;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_entries_expire() {
        let presence = Presence::new(300);
        let now = Utc::now();
        presence.mark_online("old@example.com", now - Duration::seconds(301)).await;
        presence.mark_online("new@example.com", now).await;
        assert_eq!(presence.online(now).await, vec!["new@example.com".to_string()]);
    }

    #[tokio::test]
    async fn offline_removes_entry() {
        let presence = Presence::new(300);
        let now = Utc::now();
        presence.mark_online("a@example.com", now).await;
        presence.mark_online("b@example.com", now).await;
        presence.mark_offline("a@example.com").await;
        assert_eq!(presence.online(now).await, vec!["b@example.com".to_string()]);
    }

    #[test]
    fn missing_email_is_rejected() {
        assert!(required_email(PresenceRequest { email: None }).is_err());
        assert!(required_email(PresenceRequest {
            email: Some("  ".into())
        })
        .is_err());
        assert_eq!(
            required_email(PresenceRequest {
                email: Some(" Ann@Example.com ".into())
            })
            .unwrap(),
            "ann@example.com"
        );
    }
}
