//! Verification of credentials issued by external identity providers
//!
//! Two ways in:
//! - [`FederatedVerifier`] checks an ID token the client already holds
//! - [`AuthorizationCodeFlow`] drives the browser redirect and trades the returned code
//!   for the user's profile

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::IdentityError;

pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const GOOGLE_SCOPES: &str = "openid email profile";

/// Identity asserted by an external provider
///
/// `email` is only set when the provider vouches for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FederatedProfile {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub external_id: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait FederatedVerifier: Send + Sync + 'static {
    /// Checks a provider credential and extracts the profile it asserts.
    async fn verify(&self, credential: &str) -> Result<FederatedProfile, IdentityError>;
}

/// Browser sign-in through the provider's consent page
#[async_trait]
pub trait AuthorizationCodeFlow: Send + Sync + 'static {
    /// Consent page URL; the provider hands `state` back to the callback untouched.
    fn authorize_url(&self, state: &str) -> String;

    /// Trades an authorization code for the profile of the user who granted it.
    async fn exchange_code(&self, code: &str) -> Result<FederatedProfile, IdentityError>;
}

/// Maps a provider HTTP status onto the identity error taxonomy
fn check_status(status: StatusCode, endpoint: &'static str) -> Result<(), IdentityError> {
    if status.is_server_error() {
        return Err(IdentityError::ProviderUnavailable(format!(
            "{} returned {}",
            endpoint, status
        )));
    }
    if !status.is_success() {
        debug!(http_status = %status, endpoint, "Google rejected the credential");
        return Err(IdentityError::MalformedCredential);
    }
    Ok(())
}

fn unreachable_provider(e: reqwest::Error) -> IdentityError {
    IdentityError::ProviderUnavailable(e.to_string())
}

/// Fields of Google's tokeninfo response that matter here
#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: Option<String>,
    aud: Option<String>,
    email: Option<String>,
    /// Google sends the string "true"; accept a JSON bool too
    email_verified: Option<Value>,
    name: Option<String>,
    picture: Option<String>,
}

impl TokenInfo {
    fn email_verified(&self) -> bool {
        match &self.email_verified {
            Some(Value::Bool(verified)) => *verified,
            Some(Value::String(verified)) => verified == "true",
            _ => false,
        }
    }
}

/// Verifies Google ID tokens against the tokeninfo endpoint
pub struct GoogleVerifier {
    http: reqwest::Client,
    tokeninfo_url: String,
    client_id: Option<String>,
}

impl GoogleVerifier {
    /// `client_id`, when set, must match the token's audience.
    pub fn new(
        tokeninfo_url: impl Into<String>,
        client_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            tokeninfo_url: tokeninfo_url.into(),
            client_id,
        })
    }
}

#[async_trait]
impl FederatedVerifier for GoogleVerifier {
    async fn verify(&self, credential: &str) -> Result<FederatedProfile, IdentityError> {
        if credential.trim().is_empty() {
            return Err(IdentityError::MalformedCredential);
        }

        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", credential)])
            .send()
            .await
            .map_err(unreachable_provider)?;
        check_status(response.status(), "tokeninfo")?;

        let info: TokenInfo = response.json().await.map_err(|e| {
            warn!(error = %e, "Malformed tokeninfo response");
            IdentityError::MalformedCredential
        })?;

        if let Some(expected) = &self.client_id {
            if info.aud.as_deref() != Some(expected.as_str()) {
                warn!(aud = ?info.aud, "Google credential issued for another client");
                return Err(IdentityError::MalformedCredential);
            }
        }

        let verified = info.email_verified();
        Ok(FederatedProfile {
            email: info.email.filter(|_| verified),
            display_name: info.name,
            external_id: info.sub,
            picture: info.picture,
        })
    }
}

/// OAuth client registration used by [`GoogleOAuth`]
#[derive(Debug, Clone)]
pub struct GoogleOAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    /// Must match a redirect URI registered for the client
    pub redirect_uri: String,
    pub auth_url: Url,
    pub token_url: String,
    pub userinfo_url: String,
}

#[derive(Debug, Deserialize)]
struct CodeExchange {
    access_token: String,
}

/// Google's v2 userinfo response
#[derive(Debug, Deserialize)]
struct UserInfo {
    id: Option<String>,
    email: Option<String>,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    picture: Option<String>,
}

/// Google authorization-code flow over the token and userinfo endpoints
pub struct GoogleOAuth {
    http: reqwest::Client,
    settings: GoogleOAuthSettings,
}

impl GoogleOAuth {
    pub fn new(settings: GoogleOAuthSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, settings })
    }
}

#[async_trait]
impl AuthorizationCodeFlow for GoogleOAuth {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = self.settings.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", GOOGLE_SCOPES)
            .append_pair("state", state);
        url.into()
    }

    async fn exchange_code(&self, code: &str) -> Result<FederatedProfile, IdentityError> {
        if code.trim().is_empty() {
            return Err(IdentityError::MalformedCredential);
        }

        let params = [
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        debug!("Exchanging authorization code");
        let response = self
            .http
            .post(&self.settings.token_url)
            .form(&params)
            .send()
            .await
            .map_err(unreachable_provider)?;
        check_status(response.status(), "token endpoint")?;

        let exchange: CodeExchange = response.json().await.map_err(|e| {
            warn!(error = %e, "Malformed token endpoint response");
            IdentityError::MalformedCredential
        })?;

        let response = self
            .http
            .get(&self.settings.userinfo_url)
            .bearer_auth(&exchange.access_token)
            .send()
            .await
            .map_err(unreachable_provider)?;
        check_status(response.status(), "userinfo")?;

        let info: UserInfo = response.json().await.map_err(|e| {
            warn!(error = %e, "Malformed userinfo response");
            IdentityError::MalformedCredential
        })?;

        let verified = info.verified_email;
        Ok(FederatedProfile {
            email: info.email.filter(|_| verified),
            display_name: info.name,
            external_id: info.id,
            picture: info.picture,
        })
    }
}
