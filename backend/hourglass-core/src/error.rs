// src/error.rs
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::aircall::AircallError;
use crate::auth::AuthError;
use crate::store::StoreError;
use crate::timesheet::TransitionError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<String>),
    #[error("{0}")]
    BadRequest(String),
    #[error("Invalid {0} ID")]
    InvalidId(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Duplicate(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("{0} is not configured on this server")]
    Unavailable(&'static str),
    #[error("Too many requests")]
    RateLimited,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Aircall(#[from] AircallError),
    #[error("Store error: {0}")]
    Store(StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(message) => AppError::Duplicate(message),
            other => AppError::Store(other),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::BadRequest(_)
            | AppError::InvalidId(_)
            | AppError::Duplicate(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) | AppError::Transition(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Auth(auth) => match auth {
                AuthError::InactiveAccount => StatusCode::FORBIDDEN,
                AuthError::WeakPassword
                | AuthError::OAuthStateMismatch
                | AuthError::MissingAuthCode => StatusCode::BAD_REQUEST,
                AuthError::OAuthExchange(_) | AuthError::Request(_) => StatusCode::BAD_GATEWAY,
                AuthError::TokenIssue(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Aircall(AircallError::RateLimitExceeded) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Aircall(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (message, details) = match &self {
            AppError::Validation(details) => (self.to_string(), Some(details.clone())),
            AppError::Store(_) | AppError::Internal(_) => {
                error!("Error occurred: {:?}", self);
                ("Internal server error".to_string(), None)
            }
            AppError::Auth(AuthError::TokenIssue(_)) => {
                error!("Error occurred: {:?}", self);
                ("Internal server error".to_string(), None)
            }
            AppError::Aircall(e) => {
                error!("Aircall error: {}", e);
                (
                    "An error occurred while communicating with Aircall.".to_string(),
                    None,
                )
            }
            AppError::Auth(AuthError::OAuthExchange(_)) | AppError::Auth(AuthError::Request(_)) => {
                error!("OAuth provider error: {:?}", self);
                ("Failed to complete sign-in with the provider.".to_string(), None)
            }
            _ => (self.to_string(), None),
        };

        if status.is_client_error() {
            warn!("Request rejected ({}): {}", status.as_u16(), self);
        }

        (
            status,
            Json(ErrorBody {
                success: false,
                error: message,
                details,
            }),
        )
            .into_response()
    }
}
