//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Initializes the database and services
//! - Starts the HTTP server with graceful shutdown support

use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shortlink::config::Config;
use shortlink::database::RedbStore;
use shortlink::federated::{GoogleOAuth, GoogleVerifier};
use shortlink::route::create_app;
use shortlink::state::AppState;

/// Upper bound on a call to the identity provider
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Application entry point
///
/// See [`shortlink::config`] for the environment variables read at startup.
#[tokio::main]
async fn main() {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("shortlink=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let store = RedbStore::open(&config.database_path, config.store_timeout)
        .expect("Failed to initialize database");

    let verifier = GoogleVerifier::new(
        config.google_tokeninfo_url.clone(),
        config.google_client_id.clone(),
        PROVIDER_TIMEOUT,
    )
    .expect("Failed to build HTTP client");

    let mut state = AppState::new(&config, Arc::new(store), Arc::new(verifier))
        .expect("Failed to initialize services");

    match config.google_oauth() {
        Some(settings) => {
            let flow = GoogleOAuth::new(settings, PROVIDER_TIMEOUT)
                .expect("Failed to build HTTP client");
            state = state.with_oauth(Arc::new(flow));
            info!(frontend = %config.frontend_url, "Google browser sign-in enabled");
        }
        None => info!("Google browser sign-in disabled, GOOGLE_CLIENT_SECRET not set"),
    }

    let app = create_app(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Bind to all network interfaces on the specified port
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind address");

    info!(addr = %addr, base_url = %config.base_url, "Server running");
    info!(database = %config.database_path, "Using database");

    // The server keeps running until it receives SIGTERM or SIGINT
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Handles graceful shutdown signals
///
/// Returns once SIGINT (Ctrl+C) or, on Unix, SIGTERM is received. In-flight
/// requests are allowed to complete and open database transactions finish
/// before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    // On non-Unix systems (Windows), only handle Ctrl+C
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}
