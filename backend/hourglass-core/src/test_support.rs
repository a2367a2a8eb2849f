// src/test_support.rs
//! Shared fixtures for handler tests: an app over the memory store and helpers
//! to drive it with `tower::ServiceExt::oneshot`.
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use crate::app::{build_router, AppState};
use crate::auth::{hash_password, issue_token};
use crate::config::Config;
use crate::memory_store::MemoryStore;
use crate::models::{Role, TeamMember};
use crate::store::Repository;

pub const TEST_PASSWORD: &str = "correct horse battery";

pub fn test_config() -> Config {
    envy::from_iter([
        ("JWT_SECRET".to_string(), "test-secret-key".to_string()),
        ("RATE_LIMIT_REQUESTS".to_string(), "10000".to_string()),
        ("SETUP_ADMIN_EMAIL".to_string(), "owner@example.com".to_string()),
    ])
    .unwrap()
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let repo: Arc<dyn Repository> = Arc::new(MemoryStore::default());
        let state = AppState::new(config, repo);
        let router = build_router(state.clone());
        Self { state, router }
    }

    /// Inserts an active member with [`TEST_PASSWORD`] and returns it with a token.
    pub async fn seed_member(&self, name: &str, email: &str, role: Role) -> (TeamMember, String) {
        let mut member = TeamMember::new(
            name.to_string(),
            email.to_string(),
            "Engineering".to_string(),
            "Developer".to_string(),
        );
        member.role = role;
        member.password_hash = Some(hash_password(TEST_PASSWORD).unwrap());
        self.state.repo.insert_member(&member).await.unwrap();
        let token = issue_token(&member, &self.state.config).unwrap();
        (member, token)
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(method, uri, token, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }
}
