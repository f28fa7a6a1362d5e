//! Alpaca device API dispatch: `/api/v1/{type}/{number}/{command}`

use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use skybridge_core::{DeviceEntry, Fragment, RegistryError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::state::AppState;

/// Alpaca interface version passed to the translator
const INTERFACE_VERSION: u32 = 1;

/// Longest accepted path segment
pub const MAX_SEGMENT_LEN: usize = 128;
/// Most PUT arguments collected besides the transaction fields
pub const MAX_ARGUMENTS: usize = 5;
/// Longest accepted PUT argument token
pub const MAX_ARGUMENT_LEN: usize = 128;
/// Largest accepted PUT body
pub const MAX_BODY_LEN: usize = 128 * 1024;
/// Largest response body the bridge will send
pub const MAX_RESPONSE_LEN: usize = 128 * 1024;

/// Request failures, all reported as `400 Bad Request` with a plain-text reason
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlpacaError {
    #[error("Missing device type")]
    MissingDeviceType,
    #[error("Missing device number")]
    MissingDeviceNumber,
    #[error("Missing command")]
    MissingCommand,
    #[error("Invalid device number")]
    InvalidDeviceNumber,
    #[error("Malformed path")]
    MalformedPath,
    #[error("Malformed body")]
    MalformedBody,
    #[error("Request too large")]
    RequestTooLarge,
    #[error("No such device")]
    NoSuchDevice,
    #[error("Device type doesn't match")]
    DeviceTypeMismatch,
    #[error("Unrecognised command")]
    UnrecognisedCommand,
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Invalid method")]
    InvalidMethod,
}

impl From<RegistryError> for AlpacaError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NoSuchDevice => AlpacaError::NoSuchDevice,
            RegistryError::TypeMismatch => AlpacaError::DeviceTypeMismatch,
        }
    }
}

impl IntoResponse for AlpacaError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            [(header::CONTENT_TYPE, "text/plain")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Parsed `{type}/{number}/{command}` target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target<'a> {
    pub device_type: &'a str,
    pub number: u32,
    pub command: &'a str,
}

/// Split the path after `/api/v1/` into exactly three segments
pub fn parse_target(path: &str) -> Result<Target<'_>, AlpacaError> {
    let path = path.strip_suffix('/').unwrap_or(path);
    let mut segments = path.split('/');

    let mut next_segment = |missing: AlpacaError| {
        segments
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or(missing)
    };

    let device_type = next_segment(AlpacaError::MissingDeviceType)?;
    let number = next_segment(AlpacaError::MissingDeviceNumber)?;
    let command = next_segment(AlpacaError::MissingCommand)?;
    if segments.next().is_some() {
        return Err(AlpacaError::MalformedPath);
    }
    if [device_type, number, command]
        .iter()
        .any(|segment| segment.len() > MAX_SEGMENT_LEN)
    {
        return Err(AlpacaError::RequestTooLarge);
    }

    let number = number
        .parse::<u32>()
        .map_err(|_| AlpacaError::InvalidDeviceNumber)?;

    Ok(Target {
        device_type,
        number,
        command,
    })
}

/// Client-supplied transaction fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientTransaction {
    pub client_id: u32,
    pub client_transaction_id: u32,
}

impl ClientTransaction {
    /// Try to consume a `Key=Value` token; returns false when it is not a transaction field
    fn absorb(&mut self, token: &str) -> bool {
        let (key, value) = token.split_once('=').unwrap_or((token, ""));
        let slot = if key.eq_ignore_ascii_case("ClientID") {
            &mut self.client_id
        } else if key.eq_ignore_ascii_case("ClientTransactionID") {
            &mut self.client_transaction_id
        } else {
            return false;
        };
        *slot = value.trim().parse().unwrap_or(0);
        true
    }
}

/// Pull ClientID/ClientTransactionID from a query string, ignoring everything else
pub fn parse_query(query: Option<&str>) -> ClientTransaction {
    let mut transaction = ClientTransaction::default();
    for token in query.unwrap_or_default().split('&') {
        transaction.absorb(token);
    }
    transaction
}

/// Split a PUT form body into transaction fields and canonicalized arguments
///
/// Arguments are raw `Key=Value` tokens sorted case-insensitively (ties broken
/// bytewise), so the translator sees the same order whatever order the client sent.
pub fn parse_form(body: &str) -> Result<(ClientTransaction, Vec<&str>), AlpacaError> {
    let mut transaction = ClientTransaction::default();
    let mut arguments = Vec::new();

    for token in body.trim_end_matches(['\r', '\n']).split('&') {
        if token.is_empty() || transaction.absorb(token) {
            continue;
        }
        if token.len() > MAX_ARGUMENT_LEN {
            return Err(AlpacaError::RequestTooLarge);
        }
        if arguments.len() < MAX_ARGUMENTS {
            arguments.push(token);
        }
    }

    arguments.sort_by(|a, b| {
        a.to_ascii_lowercase()
            .cmp(&b.to_ascii_lowercase())
            .then_with(|| a.cmp(b))
    });
    Ok((transaction, arguments))
}

/// Merge a translator fragment with the transaction fields and render it
pub fn envelope(
    state: &AppState,
    path: &str,
    mut fragment: Fragment,
    client_transaction_id: u32,
) -> Result<Response, AlpacaError> {
    fragment.insert(
        "ClientTransactionID".to_string(),
        Value::from(client_transaction_id),
    );

    // Sized with the widest ID first so a rejected response leaves the counter untouched
    let mut response = Value::Object(fragment);
    response["ServerTransactionID"] = Value::from(u32::MAX);
    if response.to_string().len() > MAX_RESPONSE_LEN {
        return Err(AlpacaError::ResponseTooLarge);
    }
    response["ServerTransactionID"] = Value::from(state.transactions.next());
    let body = response.to_string();

    debug!(path = %path, "200 OK");
    trace!(path = %path, body = %body, "Response body");
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// `/api/v1` with nothing after it
pub async fn missing_target() -> Response {
    warn!("/api/v1 -> 400 Missing device type");
    AlpacaError::MissingDeviceType.into_response()
}

/// Dynamic device dispatch
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    body: Body,
) -> Response {
    debug!(method = %method, path = %path, query = ?query, "Alpaca request");
    match handle(&state, &method, &path, query.as_deref(), body).await {
        Ok(response) => response,
        Err(e) => {
            warn!(method = %method, path = %path, reason = %e, "400 Bad Request");
            e.into_response()
        }
    }
}

async fn handle(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: Body,
) -> Result<Response, AlpacaError> {
    let target = parse_target(path)?;
    let device = state.registry.resolve(target.device_type, target.number)?;

    match *method {
        Method::GET => {
            let transaction = parse_query(query);
            let fragment = read(state, &device, target.command)?;
            envelope(state, path, fragment, transaction.client_transaction_id)
        }
        Method::PUT => {
            let bytes = axum::body::to_bytes(body, MAX_BODY_LEN)
                .await
                .map_err(|_| AlpacaError::RequestTooLarge)?;
            let form = std::str::from_utf8(&bytes).map_err(|_| AlpacaError::MalformedBody)?;
            trace!(path = %path, body = %form, "Request body");
            let (transaction, arguments) = parse_form(form)?;
            let fragment = write(state, &device, target.command, &arguments)?;
            envelope(state, path, fragment, transaction.client_transaction_id)
        }
        _ => Err(AlpacaError::InvalidMethod),
    }
}

fn read(state: &AppState, device: &DeviceEntry, command: &str) -> Result<Fragment, AlpacaError> {
    state
        .translator
        .read(device, INTERFACE_VERSION, command)
        .map_err(|e| {
            debug!(device = %device.name(), command, error = %e, "Translator rejected read");
            AlpacaError::UnrecognisedCommand
        })
}

fn write(
    state: &AppState,
    device: &DeviceEntry,
    command: &str,
    arguments: &[&str],
) -> Result<Fragment, AlpacaError> {
    state
        .translator
        .write(
            device,
            INTERFACE_VERSION,
            command,
            arguments.first().copied(),
            arguments.get(1).copied(),
        )
        .map_err(|e| {
            debug!(device = %device.name(), command, error = %e, "Translator rejected write");
            AlpacaError::UnrecognisedCommand
        })
}
