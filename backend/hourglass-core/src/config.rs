// src/config.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Server
    #[serde(default = "default_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,

    // Database; the in-memory store is used when unset
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    // JWT authentication
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: u64,

    // Requests per minute per client
    #[serde(default = "default_rate_limit")]
    pub rate_limit_requests: u32,

    // Google OAuth
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_redirect_uri: Option<String>,

    // Aircall
    pub aircall_api_id: Option<String>,
    pub aircall_api_token: Option<String>,
    #[serde(default = "default_aircall_base_url")]
    pub aircall_base_url: String,

    #[serde(default = "default_hourly_rate")]
    pub hourly_rate: Decimal,
    #[serde(default = "default_kpi_retention_minutes")]
    pub kpi_retention_minutes: i64,
    #[serde(default = "default_presence_ttl_secs")]
    pub presence_ttl_secs: i64,

    // Bootstrap administrator
    pub setup_admin_email: Option<String>,
    #[serde(default = "default_admin_name")]
    pub setup_admin_name: String,
    #[serde(default = "default_admin_department")]
    pub setup_admin_department: String,
    #[serde(default = "default_admin_position")]
    pub setup_admin_position: String,

    // TLS
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_max_connections() -> u32 {
    5
}
fn default_jwt_expiration_hours() -> u64 {
    24
}
fn default_rate_limit() -> u32 {
    120
}
fn default_aircall_base_url() -> String {
    "https://api.aircall.io/v1".to_string()
}
fn default_hourly_rate() -> Decimal {
    dec!(75)
}
fn default_kpi_retention_minutes() -> i64 {
    13
}
fn default_presence_ttl_secs() -> i64 {
    300
}
fn default_admin_name() -> String {
    "Administrator".to_string()
}
fn default_admin_department() -> String {
    "Management".to_string()
}
fn default_admin_position() -> String {
    "System Administrator".to_string()
}

/// Credentials needed for the Google sign-in round trip.
#[derive(Debug, Clone)]
pub struct GoogleSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct AircallSettings {
    pub api_id: String,
    pub api_token: String,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("JWT_SECRET must not be empty".into()));
        }
        if self.server_port == 0 {
            return Err(ConfigError::Invalid("SERVER_PORT must not be 0".into()));
        }
        if self.rate_limit_requests == 0 {
            return Err(ConfigError::Invalid(
                "RATE_LIMIT_REQUESTS must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn jwt_secret_bytes(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Google sign-in is only enabled when all three settings are present.
    pub fn google(&self) -> Option<GoogleSettings> {
        match (
            non_empty(&self.google_client_id),
            non_empty(&self.google_client_secret),
            non_empty(&self.google_redirect_uri),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(GoogleSettings {
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => None,
        }
    }

    pub fn aircall(&self) -> Option<AircallSettings> {
        match (
            non_empty(&self.aircall_api_id),
            non_empty(&self.aircall_api_token),
        ) {
            (Some(api_id), Some(api_token)) => Some(AircallSettings {
                api_id,
                api_token,
                base_url: self.aircall_base_url.trim_end_matches('/').to_string(),
            }),
            _ => None,
        }
    }

    pub fn tls_paths(&self) -> Option<(String, String)> {
        match (non_empty(&self.cert_path), non_empty(&self.key_path)) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }

    pub fn database_url(&self) -> Option<String> {
        non_empty(&self.database_url)
    }

    pub fn setup_admin_email(&self) -> Option<String> {
        non_empty(&self.setup_admin_email).map(|email| email.to_lowercase())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, envy::Error> {
        envy::from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = from_pairs(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.rate_limit_requests, 120);
        assert_eq!(config.hourly_rate, dec!(75));
        assert_eq!(config.kpi_retention_minutes, 13);
        assert!(config.database_url().is_none());
        assert!(config.google().is_none());
        assert!(config.aircall().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn google_requires_all_three_settings() {
        let partial = from_pairs(&[
            ("JWT_SECRET", "s3cret"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
        ])
        .unwrap();
        assert!(partial.google().is_none());

        let full = from_pairs(&[
            ("JWT_SECRET", "s3cret"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_REDIRECT_URI", "http://localhost:3000/api/auth/google/callback"),
        ])
        .unwrap();
        assert_eq!(full.google().unwrap().client_id, "id");
    }

    #[test]
    fn validate_rejects_blank_secret_and_zero_rate() {
        let blank = from_pairs(&[("JWT_SECRET", "  ")]).unwrap();
        assert!(blank.validate().is_err());

        let zero_rate = from_pairs(&[("JWT_SECRET", "x"), ("RATE_LIMIT_REQUESTS", "0")]).unwrap();
        assert!(zero_rate.validate().is_err());
    }

    #[test]
    fn aircall_base_url_loses_trailing_slash() {
        let config = from_pairs(&[
            ("JWT_SECRET", "x"),
            ("AIRCALL_API_ID", "id"),
            ("AIRCALL_API_TOKEN", "token"),
            ("AIRCALL_BASE_URL", "http://localhost:9999/v1/"),
        ])
        .unwrap();
        assert_eq!(config.aircall().unwrap().base_url, "http://localhost:9999/v1");
    }
}
