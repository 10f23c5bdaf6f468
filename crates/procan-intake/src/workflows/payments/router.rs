use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use super::handler::ConfirmationHandler;
use super::WebhookError;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Router receiving processor deliveries. The body is read raw so the signature covers it.
pub fn payments_router(handler: Arc<ConfirmationHandler>) -> Router {
    Router::new()
        .route("/api/v1/payments/webhook", post(webhook_handler))
        .with_state(handler)
}

pub(crate) async fn webhook_handler(
    State(handler): State<Arc<ConfirmationHandler>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match handler.receive(&body, signature, Utc::now()).await {
        Ok(outcome) => {
            let payload = json!({ "received": true, "outcome": outcome });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => webhook_failure(&error),
    }
}

fn webhook_failure(error: &WebhookError) -> Response {
    let status = if error.is_rejection() {
        StatusCode::BAD_REQUEST
    } else if matches!(error, WebhookError::NotConfigured) || error.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    warn!(%error, status = status.as_u16(), "payment webhook rejected");
    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}
