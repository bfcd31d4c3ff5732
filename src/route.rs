//! Route definitions for the URL shortener API
//!
//! This module configures all HTTP routes and maps them to their respective handlers.

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::handler::{
    create_short_url, current_user, delete_short_url, federated_login, google_callback,
    google_login, health_check, list_my_urls, login, redirect_url, signup,
};
use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /{slug}` - Redirects to the original URL (public)
/// - `GET /health` - Store connectivity check (public)
/// - `POST /auth/signup`, `POST /auth/login`, `POST /auth/federated` - Token issuance (public)
/// - `GET /auth/google/login`, `GET /auth/google/callback` - Browser sign-in with Google (public)
/// - `POST /shorten` - Creates a short URL (bearer token)
/// - `GET /my-urls` - Lists the caller's URLs (bearer token)
/// - `DELETE /urls/{id}` - Deletes one of the caller's URLs (bearer token)
/// - `GET /auth/me` - The caller's profile (bearer token)
///
/// Static paths take precedence over `/{slug}`; generated slugs never collide
/// with them (see `shortener::RESERVED_SLUGS`). The auth check is a route layer, so
/// unknown paths still answer 404 without a token.
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/shorten", post(create_short_url))
        .route("/my-urls", get(list_my_urls))
        .route("/urls/{id}", delete(delete_short_url))
        .route("/auth/me", get(current_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/federated", post(federated_login))
        .route("/auth/google/login", get(google_login))
        .route("/auth/google/callback", get(google_callback))
        .route("/{slug}", get(redirect_url))
        .merge(protected)
        .with_state(state)
}
