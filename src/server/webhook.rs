//! Webhook endpoint handler.
//!
//! Verifies the delivery signature, decodes the event and hands it to the
//! dispatcher in a background task. The response goes out as soon as the
//! event is accepted; plugin outcomes only show up in the logs.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::AppState;
use crate::types::DeliveryId;
use crate::webhooks::WebhookEvent;

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors that can occur when accepting a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Invalid signature.
    #[error("invalid signature")]
    InvalidSignature,

    /// Invalid JSON body.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MissingHeader(_) | WebhookError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Required headers:
///   - `X-GitHub-Event`: Event type (e.g., "issues", "pull_request")
///   - `X-GitHub-Delivery`: Unique delivery ID
///   - `X-Hub-Signature-256`: HMAC-SHA256 signature of the payload
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 202 Accepted: Event handed to the dispatcher
/// - 400 Bad Request: Missing header or invalid JSON
/// - 401 Unauthorized: Invalid signature
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    match accept(&app_state, &headers, &body) {
        Ok(event) => {
            let dispatcher = app_state.dispatcher().clone();
            tokio::spawn(async move {
                dispatcher.dispatch(event).await;
            });
            Ok((StatusCode::ACCEPTED, "Accepted"))
        }
        Err(e) => {
            error!(
                delivery = headers.get(HEADER_DELIVERY).and_then(|v| v.to_str().ok()).unwrap_or("-"),
                status = e.status().as_u16(),
                error = %e,
                "Rejected webhook delivery"
            );
            Err(e)
        }
    }
}

/// Checks the headers and signature and decodes the event.
fn accept(app_state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let event_type = get_header(headers, HEADER_EVENT)?;
    let delivery_id = DeliveryId::new(get_header(headers, HEADER_DELIVERY)?);
    let signature_header = get_header(headers, HEADER_SIGNATURE)?;

    debug!(
        delivery_id = %delivery_id,
        event_type = %event_type,
        "Received webhook"
    );

    // Verify before parsing so unsigned bodies are never decoded.
    if !app_state.webhook_secret().verify(body, &signature_header) {
        warn!(delivery_id = %delivery_id, "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    Ok(WebhookEvent::from_body(delivery_id, event_type, body)?)
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}
