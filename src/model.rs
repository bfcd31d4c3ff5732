//! Data models for the URL shortener application
//!
//! This module defines the records persisted in the store and the request/response
//! shapes exchanged over HTTP. Stored records never leave the crate directly: handlers
//! convert them into the response types below so fields like `password_hash` stay private.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which mechanism created a user account
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
}

/// A user account as stored in the database
///
/// `email` is always stored normalized (trimmed, lowercase) and is unique across
/// all accounts regardless of `auth_provider`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    /// Opaque identifier assigned by the store on insert
    pub id: String,
    pub username: String,
    pub email: String,
    /// Absent for accounts that only ever signed in through a federated provider
    pub password_hash: Option<String>,
    pub auth_provider: AuthProvider,
    pub federated_id: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A user that has not been persisted yet
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub auth_provider: AuthProvider,
    pub federated_id: Option<String>,
    pub profile_picture: Option<String>,
}

impl NewUser {
    /// Attaches the store-assigned id
    pub fn into_user(self, id: String) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            auth_provider: self.auth_provider,
            federated_id: self.federated_id,
            profile_picture: self.profile_picture,
            created_at: Utc::now(),
        }
    }
}

/// Represents a URL record stored in the database
///
/// The `slug` is unique across all live records and `owner_id` never changes
/// after creation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UrlRecord {
    /// Opaque identifier assigned by the store, used for deletion
    pub id: String,

    /// Short identifier used in the public redirect path (e.g., "abc123")
    pub slug: String,

    /// The original long URL that was shortened
    pub destination: String,

    /// Id of the user who created this record
    pub owner_id: String,

    /// Timestamp when this URL record was created
    pub created_at: DateTime<Utc>,
}

/// A URL record that has not been persisted yet
#[derive(Debug, Clone)]
pub struct NewUrlRecord {
    pub slug: String,
    pub destination: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl NewUrlRecord {
    pub fn into_record(self, id: String) -> UrlRecord {
        UrlRecord {
            id,
            slug: self.slug,
            destination: self.destination,
            owner_id: self.owner_id,
            created_at: self.created_at,
        }
    }
}

/// Request payload for creating a new short URL
///
/// # Example
/// ```json
/// { "destination": "https://example.com/very/long/url" }
/// ```
#[derive(Deserialize)]
pub struct ShortenRequest {
    #[serde(alias = "long_url")]
    pub destination: String,
}

/// Response returned after successfully creating a short URL
#[derive(Serialize)]
pub struct ShortenResponse {
    pub slug: String,

    /// The complete shortened URL (e.g., "http://localhost:8080/abc123")
    pub short_url: String,
}

/// One entry of the "my URLs" listing
#[derive(Serialize, Deserialize, Debug)]
pub struct UrlResponse {
    pub id: String,
    pub slug: String,
    pub destination: String,
    pub short_url: String,
    pub created_at: DateTime<Utc>,
}

impl UrlResponse {
    pub fn from_record(record: UrlRecord, base_url: &str) -> Self {
        Self {
            short_url: format!("{}/{}", base_url, record.slug),
            id: record.id,
            slug: record.slug,
            destination: record.destination,
            created_at: record.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Credential issued by a federated identity provider
///
/// Google's web client historically sent it as `access_token`, native clients as `id_token`.
#[derive(Deserialize)]
pub struct FederatedRequest {
    #[serde(alias = "access_token", alias = "id_token")]
    pub credential: String,
}

/// Query string Google appends when redirecting back to the callback
#[derive(Deserialize, Debug, Default)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set instead of `code` when the user declined consent
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    pub fn bearer(token: String) -> Self {
        Self {
            token,
            token_type: "bearer",
        }
    }
}

/// Public view of a user account
#[derive(Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub auth_provider: AuthProvider,
    pub profile_picture: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            auth_provider: user.auth_provider,
            profile_picture: user.profile_picture,
        }
    }
}

#[derive(Serialize)]
pub struct FederatedResponse {
    pub token: String,
    pub token_type: &'static str,
    pub user: UserResponse,
}
