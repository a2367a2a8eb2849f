// src/google_oauth.rs
use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::{
    extract::State,
    response::{IntoResponse, Redirect},
    Json,
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use url::Url;

use crate::api::ApiQuery;
use crate::app::AppState;
use crate::auth::AuthError;
use crate::auth_routes::auth_payload;
use crate::config::GoogleSettings;
use crate::error::AppError;
use crate::models::TeamMember;
use crate::team_members::save_member;
use crate::validation::normalize_email;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Pending OAuth `state` values, each valid for ten minutes.
#[derive(Default)]
pub struct OAuthStates {
    pending: Mutex<HashMap<String, Instant>>,
}

impl OAuthStates {
    pub async fn issue(&self) -> String {
        let state: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let mut pending = self.pending.lock().await;
        pending.retain(|_, issued| issued.elapsed() < STATE_TTL);
        pending.insert(state.clone(), Instant::now());
        state
    }

    /// Consumes `state`; true only if it was issued and has not expired.
    pub async fn take(&self, state: &str) -> bool {
        self.pending
            .lock()
            .await
            .remove(state)
            .is_some_and(|issued| issued.elapsed() < STATE_TTL)
    }
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

fn google_settings(state: &AppState) -> Result<GoogleSettings, AppError> {
    state.config.google().ok_or(AppError::Unavailable("Google sign-in"))
}

pub fn authorization_url(settings: &GoogleSettings, csrf_state: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(GOOGLE_AUTH_URL).map_err(|e| AppError::Internal(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("client_id", &settings.client_id)
        .append_pair("redirect_uri", &settings.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", "openid email profile")
        .append_pair("state", csrf_state);
    Ok(url)
}

// Google auth redirect
pub async fn google_auth_redirect(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let settings = google_settings(&state)?;
    let csrf_state = state.oauth_states.issue().await;
    let url = authorization_url(&settings, &csrf_state)?;
    info!("Redirecting to Google for authorization");
    Ok(Redirect::to(url.as_str()))
}

// Google auth callback
pub async fn google_auth_callback(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<GoogleCallback>,
) -> Result<impl IntoResponse, AppError> {
    let settings = google_settings(&state)?;

    if let Some(err) = params.error {
        warn!("Google returned an authorization error: {}", err);
        return Err(AuthError::MissingAuthCode.into());
    }
    let csrf_state = params.state.ok_or(AuthError::OAuthStateMismatch)?;
    if !state.oauth_states.take(&csrf_state).await {
        warn!("OAuth callback with unknown or expired state");
        return Err(AuthError::OAuthStateMismatch.into());
    }
    let code = params.code.ok_or(AuthError::MissingAuthCode)?;

    let token_res = state
        .http_client
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("code", code.as_str()),
            ("client_id", settings.client_id.as_str()),
            ("client_secret", settings.client_secret.as_str()),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(AuthError::from)?;

    if !token_res.status().is_success() {
        let status = token_res.status();
        let body = token_res.text().await.unwrap_or_default();
        error!("Google token exchange failed: {} {}", status, body);
        return Err(AuthError::OAuthExchange(format!("status {}", status)).into());
    }
    let token_data: GoogleTokenResponse = token_res.json().await.map_err(AuthError::from)?;

    let user_info: GoogleUserInfo = state
        .http_client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(&token_data.access_token)
        .send()
        .await
        .and_then(|res| res.error_for_status())
        .map_err(AuthError::from)?
        .json()
        .await
        .map_err(AuthError::from)?;

    let member = upsert_google_member(&state, user_info).await?;
    if !member.is_active() {
        return Err(AuthError::InactiveAccount.into());
    }

    info!("Member {} signed in with Google", member.email);
    Ok(Json(auth_payload(&state, member)?))
}

async fn upsert_google_member(
    state: &AppState,
    profile: GoogleUserInfo,
) -> Result<TeamMember, AppError> {
    let email = normalize_email(&profile.email);

    if let Some(mut existing) = state.repo.find_member_by_email(&email).await? {
        existing.is_google_user = true;
        if existing.avatar.is_none() {
            existing.avatar = profile.picture;
        }
        existing.updated_at = Utc::now();
        save_member(state.repo.as_ref(), &existing).await?;
        return Ok(existing);
    }

    let name = profile
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
    let mut member = TeamMember::new(
        name,
        email,
        "Unassigned".to_string(),
        "Employee".to_string(),
    );
    member.is_google_user = true;
    member.avatar = profile.picture;

    state.repo.insert_member(&member).await?;
    info!("Created member {} from Google sign-in", member.email);
    Ok(member)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn states_are_single_use() {
        let states = OAuthStates::default();
        let issued = states.issue().await;
        assert_eq!(issued.len(), 32);
        assert!(states.take(&issued).await);
        assert!(!states.take(&issued).await);
        assert!(!states.take("never-issued").await);
    }

    #[test]
    fn authorization_url_carries_state_and_client() {
        let settings = GoogleSettings {
            client_id: "client-123".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://localhost:3000/api/auth/google/callback".into(),
        };
        let url = authorization_url(&settings, "abc").unwrap();
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["state"], "abc");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(
            pairs["redirect_uri"],
            "http://localhost:3000/api/auth/google/callback"
        );
    }
}
