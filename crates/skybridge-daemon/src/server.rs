//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::alpaca;
use crate::api;
use crate::state::AppState;

/// Build the Alpaca and operator router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Alpaca management
        .route("/setup", get(api::setup))
        .route("/management/apiversions", get(api::api_versions))
        .route("/management/v1/description", get(api::description))
        .route(
            "/management/v1/configureddevices",
            get(api::configured_devices),
        )
        // Alpaca device API
        .route("/api/v1", any(alpaca::missing_target))
        .route("/api/v1/", any(alpaca::missing_target))
        .route("/api/v1/{*path}", any(alpaca::dispatch))
        // Operator endpoints
        .route("/bridge/devices", get(api::device_mapping))
        .route(
            "/bridge/discovery",
            get(api::discovery_status).put(api::update_discovery),
        )
        .route("/mng.html", get(api::management_page))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve on an already bound listener until Ctrl-C
pub async fn run(state: Arc<AppState>, listener: TcpListener) -> Result<()> {
    let app = router(state);
    info!(address = %listener.local_addr()?, protocol = "HTTP", "Starting Alpaca server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
