// src/aircall.rs
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::AircallSettings;
use crate::models::{CallDirection, CallRecord};

const PAGE_SIZE: u32 = 50;
// Upper bound on followed next links
const MAX_PAGES: usize = 200;

#[derive(Error, Debug)]
pub enum AircallError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Rate limit exceeded (Status 429)")]
    RateLimitExceeded,

    #[error("Aircall API error: Status={status}, Message='{message}'")]
    Api { status: StatusCode, message: String },
}

#[derive(Debug, Deserialize)]
struct CallsPage {
    #[serde(default)]
    calls: Vec<AircallCall>,
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    next_page_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AircallCall {
    id: i64,
    direction: Option<String>,
    started_at: Option<i64>,
    duration: Option<i64>,
    user: Option<AircallUser>,
}

#[derive(Debug, Deserialize)]
struct AircallUser {
    id: i64,
    name: Option<String>,
}

impl AircallCall {
    /// Calls without an answering user or a start time cannot be bucketed.
    fn into_record(self) -> Option<CallRecord> {
        let user = self.user?;
        let started_at = DateTime::from_timestamp(self.started_at?, 0)?;
        let direction = match self.direction.as_deref() {
            Some("inbound") => CallDirection::Inbound,
            _ => CallDirection::Outbound,
        };
        Some(CallRecord {
            id: self.id.to_string(),
            user_id: user.id.to_string(),
            name: user.name,
            started_at,
            duration_seconds: self.duration.unwrap_or(0),
            direction,
        })
    }
}

pub struct AircallClient {
    http_client: Client,
    settings: AircallSettings,
}

impl AircallClient {
    pub fn new(http_client: Client, settings: AircallSettings) -> Self {
        Self {
            http_client,
            settings,
        }
    }

    fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.settings.api_id, self.settings.api_token);
        format!("Basic {}", BASE64_STANDARD.encode(credentials))
    }

    async fn fetch_page(&self, url: &str) -> Result<CallsPage, AircallError> {
        debug!("Fetching Aircall calls page: {}", url);
        let resp = self
            .http_client
            .get(url)
            .header(AUTHORIZATION, self.basic_auth_header())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<CallsPage>().await?);
        }

        let body = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
        error!("Aircall API Error Response: Status={}, Body='{}'", status, body);

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Aircall rate limit exceeded");
            Err(AircallError::RateLimitExceeded)
        } else {
            Err(AircallError::Api {
                status,
                message: body,
            })
        }
    }

    /// All calls started in `[from, to)`, following pagination.
    pub async fn calls_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CallRecord>, AircallError> {
        let mut next = Some(format!(
            "{}/calls?from={}&to={}&per_page={}&order=asc",
            self.settings.base_url,
            from.timestamp(),
            to.timestamp(),
            PAGE_SIZE
        ));
        let mut records = Vec::new();
        let mut pages = 0;

        while let Some(url) = next.take() {
            let page = self.fetch_page(&url).await?;
            records.extend(page.calls.into_iter().filter_map(AircallCall::into_record));
            pages += 1;
            if pages >= MAX_PAGES {
                warn!("Stopping Aircall pagination after {} pages", pages);
                break;
            }
            next = page.meta.and_then(|m| m.next_page_link);
        }

        info!(
            "Fetched {} calls from Aircall across {} page(s)",
            records.len(),
            pages
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_page_maps_to_records() {
        let page: CallsPage = serde_json::from_value(serde_json::json!({
            "calls": [
                {"id": 1, "direction": "outbound", "started_at": 1_704_099_600, "duration": 90,
                 "user": {"id": 42, "name": "Agent Smith"}},
                {"id": 2, "direction": "inbound", "started_at": 1_704_099_700, "duration": 30,
                 "user": {"id": 42, "name": "Agent Smith"}},
                {"id": 3, "direction": "inbound", "started_at": 1_704_099_800, "duration": 0,
                 "user": null}
            ],
            "meta": {"next_page_link": null}
        }))
        .unwrap();

        let records: Vec<CallRecord> =
            page.calls.into_iter().filter_map(AircallCall::into_record).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id, "42");
        assert_eq!(records[0].duration_seconds, 90);
        assert_eq!(records[0].direction, CallDirection::Outbound);
        assert_eq!(records[1].direction, CallDirection::Inbound);
    }

    #[test]
    fn basic_auth_encodes_id_and_token() {
        let client = AircallClient::new(
            Client::new(),
            AircallSettings {
                api_id: "id".into(),
                api_token: "token".into(),
                base_url: "https://api.aircall.io/v1".into(),
            },
        );
        assert_eq!(client.basic_auth_header(), "Basic aWQ6dG9rZW4=");
    }
}
