//! Management, setup, and operator endpoints

use axum::{
    extract::{RawQuery, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::alpaca::{envelope, parse_query};
use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// Wrap a management `Value` in the Alpaca envelope
fn management_response(
    state: &AppState,
    path: &str,
    query: Option<&str>,
    value: serde_json::Value,
) -> Response {
    let transaction = parse_query(query);
    let mut fragment = serde_json::Map::new();
    fragment.insert("Value".to_string(), value);
    envelope(state, path, fragment, transaction.client_transaction_id)
        .unwrap_or_else(IntoResponse::into_response)
}

/// `GET /setup`: redirect to the management page
pub async fn setup(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!(location = %state.config.server.setup_page, "Setup redirect");
    (
        StatusCode::MOVED_PERMANENTLY,
        [
            (header::LOCATION, state.config.server.setup_page.clone()),
            (header::CONTENT_TYPE, "text/plain".to_string()),
        ],
    )
}

/// `GET /management/apiversions`
pub async fn api_versions(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Response {
    management_response(&state, "/management/apiversions", query.as_deref(), json!([1]))
}

/// `GET /management/v1/description`
pub async fn description(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Response {
    let server = &state.config.server;
    let value = json!({
        "ServerName": server.name,
        "ServerVersion": env!("CARGO_PKG_VERSION"),
        "Manufacturer": server.manufacturer,
        "ManufacturerURL": server.manufacturer_url,
        "Location": server.location,
    });
    management_response(&state, "/management/v1/description", query.as_deref(), value)
}

/// `GET /management/v1/configureddevices`
pub async fn configured_devices(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Response {
    let devices = state.registry.configured_devices();
    management_response(
        &state,
        "/management/v1/configureddevices",
        query.as_deref(),
        json!(devices),
    )
}

/// `GET /bridge/devices`: operator device mapping
pub async fn device_mapping(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.mapping())
}

/// `GET /bridge/discovery`
pub async fn discovery_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.discovery.status().await)
}

/// Request to change the discovery port
#[derive(Deserialize)]
pub struct DiscoveryPortRequest {
    pub port: u16,
}

/// `PUT /bridge/discovery`: restart discovery on a new port
pub async fn update_discovery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DiscoveryPortRequest>,
) -> Response {
    match state.set_discovery_port(req.port).await {
        Ok(addr) => {
            info!(addr = %addr, "Discovery restarted");
            Json(state.discovery.status().await).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(format!("Discovery restart failed: {}", e))),
        )
            .into_response(),
    }
}

/// `GET /mng.html`: minimal management page
pub async fn management_page(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.discovery.status().await;
    let rows: String = state
        .mapping()
        .iter()
        .map(|row| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape_html(&row.label),
                escape_html(&row.device),
                row.since.format("%Y-%m-%d %H:%M:%S UTC")
            )
        })
        .collect();
    let discovery = match (status.running, status.local_addr) {
        (true, Some(addr)) => format!("listening on UDP port {}", addr.port()),
        _ => format!("stopped (configured port {})", status.port),
    };

    Html(format!(
        "<!DOCTYPE html>\n<html><head><title>{name}</title></head><body>\n\
         <h1>{name}</h1>\n<p>Discovery: {discovery}</p>\n\
         <table><tr><th>Alpaca device</th><th>Bus device</th><th>Since</th></tr>\n{rows}</table>\n\
         </body></html>\n",
        name = escape_html(&state.config.server.name),
    ))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
