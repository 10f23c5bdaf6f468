use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::warn;

use super::checkout::{bounded, CheckoutDispatcher, DispatchError};
use super::discounts::{AppliedPromo, DiscountError};
use super::domain::{
    BillingCadence, BillingSelection, DeepCleanService, PadService, TrashService,
};
use super::pricing::lenient_locations;
use super::quote::{compute_quote, QuoteInputs};
use super::submission::{build_submission, confirmation_problems, ContactFields};
use crate::workflows::collaborators::StoreError;

/// Address suggestions returned to the form.
pub const SUGGESTION_LIMIT: usize = 5;
const MIN_ADDRESS_QUERY: usize = 3;

/// Raw intake selections as posted by the form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteRequest {
    #[serde(default)]
    pub trash: TrashService,
    #[serde(default)]
    pub pad: PadService,
    #[serde(default)]
    pub deep_clean: DeepCleanService,
    #[serde(default = "single_location", deserialize_with = "lenient_locations")]
    pub locations: u32,
    #[serde(default)]
    pub billing: BillingCadence,
    #[serde(default)]
    pub one_time_only: bool,
    #[serde(default)]
    pub deposit_reservation: bool,
    #[serde(default, deserialize_with = "optional_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub promo_code: Option<String>,
    /// Customer's local calendar date; the server date is used when absent.
    #[serde(default, deserialize_with = "optional_date")]
    pub today: Option<NaiveDate>,
}

fn single_location() -> u32 {
    1
}

fn optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            let day = value.get(..10).unwrap_or(value);
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
    }
}

impl QuoteRequest {
    /// Normalize raw selections into engine inputs, resolving the promo code.
    pub fn into_inputs(self, fallback_today: NaiveDate) -> Result<QuoteInputs, DiscountError> {
        let promo = match self.promo_code.as_deref() {
            Some(raw) => AppliedPromo::lookup(raw)?,
            None => None,
        };
        let billing = BillingSelection::new(
            self.billing,
            self.one_time_only,
            self.deposit_reservation,
            self.start_date,
        );

        Ok(QuoteInputs {
            trash: self.trash,
            pad: self.pad,
            deep_clean: self.deep_clean,
            locations: self.locations.max(1),
            billing,
            promo,
            today: self.today.unwrap_or(fallback_today),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    pub quote: QuoteRequest,
    pub contact: ContactFields,
}

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    #[serde(default)]
    pub q: String,
}

/// Router exposing quote, submission, and address lookup endpoints.
pub fn intake_router(dispatcher: Arc<CheckoutDispatcher>) -> Router {
    Router::new()
        .route("/api/v1/intake/quote", post(quote_handler))
        .route("/api/v1/intake/submissions", post(submission_handler))
        .route("/api/v1/address/suggest", get(suggest_handler))
        .route("/api/v1/address/geocode", get(geocode_handler))
        .with_state(dispatcher)
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

fn quote_failure(error: impl ToString) -> Response {
    let payload = json!({
        "ok": false,
        "error": error.to_string(),
    });
    (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
}

pub(crate) async fn quote_handler(axum::Json(request): axum::Json<QuoteRequest>) -> Response {
    let inputs = match request.into_inputs(local_today()) {
        Ok(inputs) => inputs,
        Err(error) => return quote_failure(error),
    };
    match compute_quote(&inputs) {
        Ok(quote) => (StatusCode::OK, axum::Json(quote)).into_response(),
        Err(error) => quote_failure(error),
    }
}

pub(crate) async fn submission_handler(
    State(dispatcher): State<Arc<CheckoutDispatcher>>,
    axum::Json(request): axum::Json<SubmissionRequest>,
) -> Response {
    let SubmissionRequest { quote, contact } = request;
    let inputs = match quote.into_inputs(local_today()) {
        Ok(inputs) => inputs,
        Err(error) => return quote_failure(error),
    };
    let quote = match compute_quote(&inputs) {
        Ok(quote) => quote,
        Err(error) => return quote_failure(error),
    };

    let problems = confirmation_problems(&quote, &contact);
    if !problems.is_empty() {
        let payload = json!({
            "ok": false,
            "error": problems.join(" "),
            "problems": problems,
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    }

    let submission = build_submission(&quote, &contact);
    match dispatcher.dispatch(&submission).await {
        Ok(outcome) => {
            let payload = json!({
                "submission": submission,
                "outcome": outcome,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => dispatch_failure(&error),
    }
}

fn dispatch_failure(error: &DispatchError) -> Response {
    let status = match error {
        DispatchError::AmountTooSmall { .. }
        | DispatchError::AmountOutOfRange { .. }
        | DispatchError::Store(StoreError::CashRequiresOneTime) => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        other if other.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    };
    if status != StatusCode::UNPROCESSABLE_ENTITY {
        warn!(%error, retryable = error.is_retryable(), "submission dispatch failed");
    }
    let payload = json!({
        "error": error.to_string(),
        "retryable": error.is_retryable(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn suggest_handler(
    State(dispatcher): State<Arc<CheckoutDispatcher>>,
    Query(query): Query<AddressQuery>,
) -> Response {
    let q = query.q.trim();
    if q.chars().count() < MIN_ADDRESS_QUERY {
        return (StatusCode::OK, axum::Json(Vec::<Value>::new())).into_response();
    }

    let timeout = dispatcher.settings().timeout;
    let lookup = dispatcher.geocoder().suggest(q, SUGGESTION_LIMIT);
    let hits = match bounded("geocoder", timeout, lookup).await {
        Ok(Ok(mut hits)) => {
            hits.truncate(SUGGESTION_LIMIT);
            hits
        }
        Ok(Err(error)) => {
            warn!(%error, "address suggest failed");
            Vec::new()
        }
        Err(error) => {
            warn!(%error, "address suggest timed out");
            Vec::new()
        }
    };
    (StatusCode::OK, axum::Json(hits)).into_response()
}

pub(crate) async fn geocode_handler(
    State(dispatcher): State<Arc<CheckoutDispatcher>>,
    Query(query): Query<AddressQuery>,
) -> Response {
    let q = query.q.trim();
    if q.chars().count() < MIN_ADDRESS_QUERY {
        return (StatusCode::OK, axum::Json(Value::Null)).into_response();
    }

    let timeout = dispatcher.settings().timeout;
    let best = match bounded("geocoder", timeout, dispatcher.geocoder().best_match(q)).await {
        Ok(Ok(point)) => point,
        Ok(Err(error)) => {
            warn!(%error, "address geocode failed");
            None
        }
        Err(error) => {
            warn!(%error, "address geocode timed out");
            None
        }
    };
    (StatusCode::OK, axum::Json(best)).into_response()
}
