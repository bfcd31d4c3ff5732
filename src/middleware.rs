use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

/// Identity of the caller, attached to the request by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

/// Middleware to require a valid bearer token
///
/// Expects `Authorization: Bearer <token>`. On success the owner id carried by the
/// token is inserted into the request extensions as [`AuthUser`]. Missing header,
/// wrong scheme, bad signature and expiry all produce the same 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            debug!("Missing or malformed authorization header");
            AppError::Unauthorized
        })?;

    let owner_id = state.tokens.verify(token)?;
    request.extensions_mut().insert(AuthUser { id: owner_id });

    Ok(next.run(request).await)
}
