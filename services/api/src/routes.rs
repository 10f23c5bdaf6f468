use crate::infra::{AppState, Collaborators};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use procan_intake::config::CollaboratorConfig;
use procan_intake::workflows::fulfillment::{fulfillment_router, FulfillmentService};
use procan_intake::workflows::intake::{intake_router, CheckoutDispatcher, DispatchSettings};
use procan_intake::workflows::payments::{
    payments_router, ConfirmationHandler, ConfirmationSettings,
};
use serde_json::json;
use std::sync::Arc;

/// Workflow services shared by the routers.
pub(crate) struct Services {
    pub(crate) dispatcher: Arc<CheckoutDispatcher>,
    pub(crate) confirmations: Arc<ConfirmationHandler>,
    pub(crate) fulfillment: Arc<FulfillmentService>,
}

impl Services {
    pub(crate) fn assemble(config: &CollaboratorConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            payments,
            billing,
            cash_orders,
            ledger,
            geocoder,
            notifier,
        } = collaborators;

        let dispatcher = CheckoutDispatcher::new(
            payments,
            cash_orders,
            geocoder,
            DispatchSettings {
                public_origin: config.public_origin.clone(),
                timeout: config.timeout,
            },
        );
        let confirmations = ConfirmationHandler::new(
            ledger.clone(),
            notifier,
            ConfirmationSettings {
                webhook_secret: config
                    .stripe
                    .as_ref()
                    .and_then(|stripe| stripe.webhook_secret.clone()),
                staff_inbox: config
                    .email
                    .as_ref()
                    .and_then(|email| email.notify_to.clone()),
            },
        );
        let fulfillment = FulfillmentService::new(ledger, billing, config.staff_token.clone());

        Self {
            dispatcher: Arc::new(dispatcher),
            confirmations: Arc::new(confirmations),
            fulfillment: Arc::new(fulfillment),
        }
    }
}

pub(crate) fn with_service_routes(services: &Services) -> axum::Router {
    intake_router(services.dispatcher.clone())
        .merge(payments_router(services.confirmations.clone()))
        .merge(fulfillment_router(services.fulfillment.clone()))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
