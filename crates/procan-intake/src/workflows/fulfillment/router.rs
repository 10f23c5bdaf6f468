use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use super::auth::bearer_matches;
use super::cancel::CancelRequest;
use super::schedule::ScheduleRequest;
use super::{FulfillmentError, FulfillmentService};

/// Staff endpoints. Every route requires the static bearer token.
pub fn fulfillment_router(service: Arc<FulfillmentService>) -> Router {
    Router::new()
        .route("/api/v1/orders/cancel", post(cancel_handler))
        .route("/api/v1/routes/schedule", post(schedule_handler))
        .with_state(service)
}

fn authorize(service: &FulfillmentService, headers: &HeaderMap) -> Result<(), FulfillmentError> {
    if bearer_matches(headers, service.staff_token()) {
        Ok(())
    } else {
        Err(FulfillmentError::Unauthorized)
    }
}

pub(crate) async fn cancel_handler(
    State(service): State<Arc<FulfillmentService>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CancelRequest>,
) -> Response {
    if let Err(error) = authorize(&service, &headers) {
        return fulfillment_failure(&error);
    }
    match service.cancel_order(&request, Utc::now()).await {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(error) => fulfillment_failure(&error),
    }
}

pub(crate) async fn schedule_handler(
    State(service): State<Arc<FulfillmentService>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ScheduleRequest>,
) -> Response {
    if let Err(error) = authorize(&service, &headers) {
        return fulfillment_failure(&error);
    }
    match service.schedule_route(&request).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => fulfillment_failure(&error),
    }
}

fn fulfillment_failure(error: &FulfillmentError) -> Response {
    let status = match error {
        FulfillmentError::Unauthorized => StatusCode::UNAUTHORIZED,
        FulfillmentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        FulfillmentError::OrderNotFound => StatusCode::NOT_FOUND,
        other if other.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        warn!(%error, "staff operation failed");
    }
    let payload = json!({
        "error": error.to_string(),
        "retryable": error.is_retryable(),
    });
    (status, axum::Json(payload)).into_response()
}
