//! Error types for every component and their translation to HTTP responses
//!
//! Components return the typed errors below. Only [`AppError`] knows about status
//! codes, and its messages are deliberately generic so responses never reveal
//! whether an account exists or who owns a record.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Failures of the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index already holds the key
    #[error("duplicate key: {0}")]
    Conflict(String),
    #[error("store operation timed out")]
    Timeout,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored document is malformed: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the caller may simply retry the request later
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout | StoreError::Unavailable(_))
    }
}

macro_rules! backend_error {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    StoreError::Unavailable(e.to_string())
                }
            }
        )+
    };
}

backend_error!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

#[derive(Debug, Error)]
pub enum ShortenError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("url record not found")]
    NotFound,
    #[error("no free slug after {attempts} attempts")]
    SlugSpaceExhausted { attempts: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad signature, malformed payload and expiry all collapse into this variant
    #[error("invalid token")]
    Invalid,
    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("federated profile carries no verified email")]
    MissingEmail,
    #[error("malformed federated credential")]
    MalformedCredential,
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("user not found")]
    UserNotFound,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// API error returned by handlers and middleware
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    NotFound,
    Unprocessable(String),
    ServiceUnavailable,
    Internal,
}

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "bad_request"),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid credentials or token".to_string(),
                "unauthorized",
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "URL not found".to_string(),
                "not_found",
            ),
            AppError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg, "invalid_input")
            }
            AppError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable, please retry".to_string(),
                "unavailable",
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        if e.is_transient() {
            warn!(error = %e, "Store unavailable");
            AppError::ServiceUnavailable
        } else {
            error!(error = %e, "Store failure");
            AppError::Internal
        }
    }
}

impl From<ShortenError> for AppError {
    fn from(e: ShortenError) -> Self {
        match e {
            ShortenError::InvalidUrl(_) => AppError::Unprocessable("Invalid URL".to_string()),
            ShortenError::NotFound => AppError::NotFound,
            ShortenError::SlugSpaceExhausted { attempts } => {
                error!(attempts, "Slug space exhausted, every draw collided");
                AppError::Internal
            }
            ShortenError::Store(e) => e.into(),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid => AppError::Unauthorized,
            TokenError::Signing(msg) => {
                error!(error = %msg, "Failed to sign token");
                AppError::Internal
            }
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidInput(msg) => AppError::BadRequest(msg),
            IdentityError::EmailTaken => {
                AppError::BadRequest("Email already registered".to_string())
            }
            IdentityError::InvalidCredentials | IdentityError::UserNotFound => {
                AppError::Unauthorized
            }
            IdentityError::MissingEmail => {
                AppError::BadRequest("Email not provided by identity provider".to_string())
            }
            IdentityError::MalformedCredential => {
                AppError::BadRequest("Invalid federated credential".to_string())
            }
            IdentityError::ProviderUnavailable(msg) => {
                warn!(error = %msg, "Identity provider unavailable");
                AppError::ServiceUnavailable
            }
            IdentityError::Hashing(msg) => {
                error!(error = %msg, "Password hashing failed");
                AppError::Internal
            }
            IdentityError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_store_errors_map_to_503() {
        let status = AppError::from(StoreError::Timeout).into_response().status();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let status = AppError::from(StoreError::Unavailable("io".into()))
            .into_response()
            .status();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn slug_exhaustion_is_internal() {
        let err = ShortenError::SlugSpaceExhausted { attempts: 5 };
        let status = AppError::from(err).into_response().status();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_url_is_unprocessable() {
        let err = ShortenError::InvalidUrl("ftp://x".into());
        let status = AppError::from(err).into_response().status();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn credential_failures_are_indistinguishable() {
        let a = AppError::from(IdentityError::InvalidCredentials).into_response();
        let b = AppError::from(TokenError::Invalid).into_response();
        assert_eq!(a.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(b.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn email_taken_is_bad_request() {
        let status = AppError::from(IdentityError::EmailTaken)
            .into_response()
            .status();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
