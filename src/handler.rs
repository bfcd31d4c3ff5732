//! HTTP request handlers for the URL shortener API
//!
//! Handlers only translate between HTTP and the services in [`AppState`]:
//! - Creating short URLs for the authenticated caller
//! - Redirecting slugs to their destinations (public)
//! - Listing and deleting the caller's own URLs
//! - Signup, login and federated login

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use rand::{distr::Alphanumeric, Rng};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, IdentityError};
use crate::middleware::AuthUser;
use crate::model::{
    FederatedRequest, FederatedResponse, LoginRequest, OAuthCallbackParams, ShortenRequest,
    ShortenResponse, SignupRequest, TokenResponse, UrlResponse, UserResponse,
};
use crate::state::AppState;

/// Cookie carrying the OAuth `state` between login and callback
const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Unwraps a JSON body, replacing axum's plain-text rejection with `on_reject`
fn parse_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    on_reject: impl FnOnce() -> AppError,
) -> Result<T, AppError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        debug!(status = %rejection.status(), error = %rejection.body_text(), "Rejected request body");
        on_reject()
    })
}

fn invalid_body() -> AppError {
    AppError::BadRequest("Invalid request body".to_string())
}

fn oauth_failed() -> AppError {
    AppError::BadRequest("Google authentication failed".to_string())
}

fn header_value(value: String) -> Result<HeaderValue, AppError> {
    HeaderValue::try_from(value).map_err(|e| {
        error!(error = %e, "Not a valid header value");
        AppError::Internal
    })
}

fn random_oauth_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn oauth_state_cookie(value: &str, max_age: u32) -> String {
    format!(
        "{}={}; Path=/auth/google; Max-Age={}; HttpOnly; SameSite=Lax",
        OAUTH_STATE_COOKIE, value, max_age
    )
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Creates a new short URL owned by the caller
///
/// # Request Body
///
/// ```json
/// { "destination": "https://example.com/very/long/url" }
/// ```
///
/// # Response
///
/// - **200 OK** - `{ "slug": "abc123", "short_url": "http://localhost:8080/abc123" }`
/// - **401 Unauthorized** - Missing or invalid token
/// - **422 Unprocessable Entity** - Destination is not an absolute http(s) URL
pub async fn create_short_url(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<ShortenRequest>, JsonRejection>,
) -> Result<Json<ShortenResponse>, AppError> {
    let payload = parse_body(payload, || AppError::Unprocessable("Invalid URL".to_string()))?;
    let record = state.shortener.shorten(&payload.destination, &user.id).await?;

    Ok(Json(ShortenResponse {
        short_url: format!("{}/{}", state.base_url, record.slug),
        slug: record.slug,
    }))
}

/// Redirects a slug to its original destination
///
/// Public endpoint. Answers **302 Found** with a `Location` header, or
/// **404 Not Found** when the slug is unknown.
pub async fn redirect_url(
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let destination = state.resolver.resolve(&slug).await?;
    let location = HeaderValue::try_from(destination).map_err(|e| {
        error!(%slug, error = %e, "Stored destination is not a valid header value");
        AppError::Internal
    })?;
    debug!(%slug, "Redirecting");

    Ok((StatusCode::FOUND, [(LOCATION, location)]))
}

/// Lists the caller's URLs, newest first (at most 100)
pub async fn list_my_urls(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<UrlResponse>>, AppError> {
    let records = state.shortener.list_owned(&user.id).await?;
    debug!(owner_id = %user.id, count = records.len(), "Listed URLs");

    Ok(Json(
        records
            .into_iter()
            .map(|record| UrlResponse::from_record(record, &state.base_url))
            .collect(),
    ))
}

/// Deletes one of the caller's URLs by record id
///
/// - **200 OK** - URL deleted
/// - **404 Not Found** - No such record, or it belongs to someone else
pub async fn delete_short_url(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    state.shortener.delete_owned(&id, &user.id).await?;

    Ok(Json(json!({
        "message": "URL deleted successfully",
        "deleted_id": id
    })))
}

/// Creates a local account and returns a token for it
///
/// - **200 OK** - `{ "token": "...", "token_type": "bearer" }`
/// - **400 Bad Request** - Email already registered or invalid input
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let payload = parse_body(payload, invalid_body)?;
    let user = state
        .identity
        .signup(&payload.username, &payload.email, &payload.password)
        .await?;
    let token = state.tokens.issue(&user.id)?;

    Ok(Json(TokenResponse::bearer(token)))
}

/// Exchanges email and password for a token
///
/// Any failure is **401 Unauthorized** with the same body.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let payload = parse_body(payload, invalid_body)?;
    let user = state.identity.login(&payload.email, &payload.password).await?;
    let token = state.tokens.issue(&user.id)?;
    info!(user_id = %user.id, "User logged in");

    Ok(Json(TokenResponse::bearer(token)))
}

/// Exchanges a federated provider credential for a token
///
/// The local user is found by email or created on first login.
pub async fn federated_login(
    State(state): State<AppState>,
    payload: Result<Json<FederatedRequest>, JsonRejection>,
) -> Result<Json<FederatedResponse>, AppError> {
    let payload = parse_body(payload, || IdentityError::MalformedCredential.into())?;
    let profile = state.federated.verify(&payload.credential).await?;
    let user = state.identity.resolve_federated_user(profile).await?;
    let token = state.tokens.issue(&user.id)?;
    info!(user_id = %user.id, "Federated login");

    Ok(Json(FederatedResponse {
        token,
        token_type: "bearer",
        user: user.into(),
    }))
}

/// Starts browser sign-in with Google
///
/// - **302 Found** - To Google's consent page, with a 10 minute cookie holding the
///   `state` the callback must see again
/// - **404 Not Found** - No OAuth client configured
pub async fn google_login(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let flow = state.oauth.as_ref().ok_or_else(|| {
        debug!("Browser sign-in requested but no OAuth client is configured");
        AppError::NotFound
    })?;

    let csrf = random_oauth_state();
    let location = header_value(flow.authorize_url(&csrf))?;
    let cookie = header_value(oauth_state_cookie(&csrf, 600))?;

    Ok((StatusCode::FOUND, [(LOCATION, location), (SET_COOKIE, cookie)]))
}

/// Finishes browser sign-in
///
/// Checks `state` against the cookie, trades the code for the user's Google profile
/// and redirects to the frontend with `?token=...&user_id=...`.
///
/// - **302 Found** - Signed in
/// - **400 Bad Request** - State mismatch, consent declined or code rejected
/// - **503 Service Unavailable** - Google unreachable
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<OAuthCallbackParams>,
) -> Result<impl IntoResponse, AppError> {
    let flow = state.oauth.as_ref().ok_or(AppError::NotFound)?;

    let expected = cookie_value(&headers, OAUTH_STATE_COOKIE).filter(|value| !value.is_empty());
    if expected.is_none() || expected != params.state.as_deref() {
        warn!("OAuth callback state does not match the login cookie");
        return Err(oauth_failed());
    }
    if let Some(reason) = &params.error {
        debug!(%reason, "Google sign-in declined");
        return Err(oauth_failed());
    }
    let code = params.code.as_deref().ok_or_else(oauth_failed)?;

    let profile = flow.exchange_code(code).await.map_err(|e| match e {
        IdentityError::MalformedCredential => oauth_failed(),
        other => other.into(),
    })?;
    let user = state.identity.resolve_federated_user(profile).await?;
    let token = state.tokens.issue(&user.id)?;
    info!(user_id = %user.id, "Browser sign-in");

    let mut target = (*state.frontend_url).clone();
    target
        .query_pairs_mut()
        .append_pair("token", &token)
        .append_pair("user_id", &user.id);
    let location = header_value(target.into())?;
    let cleared = header_value(oauth_state_cookie("", 0))?;

    Ok((StatusCode::FOUND, [(LOCATION, location), (SET_COOKIE, cleared)]))
}

/// Returns the caller's profile
pub async fn current_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.identity.find_user(&user.id).await?;
    Ok(Json(user.into()))
}

/// Reports whether the store answers
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let timestamp = Utc::now().to_rfc3339();
    match state.urls.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected",
                "timestamp": timestamp
            })),
        ),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                    "timestamp": timestamp
                })),
            )
        }
    }
}
