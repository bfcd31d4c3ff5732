//! Runtime configuration read from the environment
//!
//! `main` loads `.env` through dotenvy first, so every key below can live in
//! either place.
//!
//! - `PORT` - Server port number (default: 8080)
//! - `DATABASE_URL` - Path to database file (default: "data.db")
//! - `URL` - Public base URL used to build short links (default: "http://localhost:{PORT}")
//! - `JWT_SECRET` - Token signing secret (required)
//! - `ACCESS_TOKEN_EXPIRE_MINUTES` - Token TTL (default: 60)
//! - `BCRYPT_COST` - Password hashing cost (default: 12)
//! - `STORE_TIMEOUT_MS` - Upper bound on a single store call (default: 5000)
//! - `GOOGLE_CLIENT_ID` - Expected audience of Google credentials (optional)
//! - `GOOGLE_TOKENINFO_URL` - Google's credential verification endpoint
//! - `GOOGLE_CLIENT_SECRET` - Enables the browser sign-in flow together with `GOOGLE_CLIENT_ID`
//! - `GOOGLE_REDIRECT_URI` - OAuth callback (default: "{URL}/auth/google/callback")
//! - `GOOGLE_AUTH_URL`, `GOOGLE_TOKEN_URL`, `GOOGLE_USERINFO_URL` - Google OAuth endpoints
//! - `FRONTEND_URL` - Where the OAuth callback sends the browser (default: "http://localhost:5173")

use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::federated::{
    GoogleOAuthSettings, GOOGLE_AUTH_URL, GOOGLE_TOKENINFO_URL, GOOGLE_TOKEN_URL,
    GOOGLE_USERINFO_URL,
};

const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Public origin of the redirect endpoint, without trailing slash
    pub base_url: String,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub bcrypt_cost: u32,
    pub store_timeout: Duration,
    pub google_client_id: Option<String>,
    pub google_tokeninfo_url: String,
    pub google_client_secret: Option<String>,
    pub google_redirect_uri: String,
    pub google_auth_url: Url,
    pub google_token_url: String,
    pub google_userinfo_url: String,
    /// Receives `?token=...&user_id=...` after a browser sign-in
    pub frontend_url: Url,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = parse_or(&get, "PORT", 8080u16)?;

        let base_url = match get("URL") {
            Some(url) => url.trim().trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", port),
        };

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let ttl_minutes = parse_or(&get, "ACCESS_TOKEN_EXPIRE_MINUTES", 60i64)?;
        if ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                key: "ACCESS_TOKEN_EXPIRE_MINUTES",
                value: ttl_minutes.to_string(),
            });
        }

        let bcrypt_cost = parse_or(&get, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        let store_timeout_ms = parse_or(&get, "STORE_TIMEOUT_MS", 5000u64)?;

        let google_redirect_uri = get("GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|| format!("{}/auth/google/callback", base_url));
        let google_auth_url = parse_url(&get, "GOOGLE_AUTH_URL", GOOGLE_AUTH_URL)?;
        let frontend_url = parse_url(&get, "FRONTEND_URL", DEFAULT_FRONTEND_URL)?;

        Ok(Self {
            port,
            database_path: get("DATABASE_URL").unwrap_or_else(|| "data.db".to_string()),
            base_url,
            jwt_secret,
            token_ttl: chrono::Duration::minutes(ttl_minutes),
            bcrypt_cost,
            store_timeout: Duration::from_millis(store_timeout_ms),
            google_client_id: get("GOOGLE_CLIENT_ID"),
            google_tokeninfo_url: get("GOOGLE_TOKENINFO_URL")
                .unwrap_or_else(|| GOOGLE_TOKENINFO_URL.to_string()),
            google_client_secret: get("GOOGLE_CLIENT_SECRET"),
            google_redirect_uri,
            google_auth_url,
            google_token_url: get("GOOGLE_TOKEN_URL").unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            google_userinfo_url: get("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|| GOOGLE_USERINFO_URL.to_string()),
            frontend_url,
        })
    }

    /// Browser sign-in settings, present only when both client id and secret are set.
    pub fn google_oauth(&self) -> Option<GoogleOAuthSettings> {
        Some(GoogleOAuthSettings {
            client_id: self.google_client_id.clone()?,
            client_secret: self.google_client_secret.clone()?,
            redirect_uri: self.google_redirect_uri.clone(),
            auth_url: self.google_auth_url.clone(),
            token_url: self.google_token_url.clone(),
            userinfo_url: self.google_userinfo_url.clone(),
        })
    }
}

fn parse_url<G>(get: &G, key: &'static str, default: &str) -> Result<Url, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = get(key).unwrap_or_else(|| default.to_string());
    Url::parse(value.trim()).map_err(|_| ConfigError::Invalid { key, value })
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
