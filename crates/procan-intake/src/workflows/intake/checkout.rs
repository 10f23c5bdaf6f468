use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{BillingType, PaymentMethod};
use super::submission::Submission;
use crate::workflows::collaborators::{
    CashOrderStore, CheckoutMode, CheckoutSessionRequest, GatewayError, GeoPoint, Geocoder,
    PaymentGateway, StoreError,
};

/// Smallest charge the processor accepts, in cents.
pub const MIN_CHARGE_CENTS: i64 = 50;
pub const CURRENCY: &str = "usd";
const PRODUCT_NAME: &str = "ProCan Sanitation Service";

/// Which collaborator receives a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchRoute {
    HostedCheckout,
    CashOrder,
}

/// Cash is only ever accepted for one-time orders.
pub fn route_for(submission: &Submission) -> DispatchRoute {
    let billing = submission.billing();
    if billing.payment_method == PaymentMethod::Cash && billing.one_time_only {
        DispatchRoute::CashOrder
    } else {
        DispatchRoute::HostedCheckout
    }
}

/// Round to whole cents, half away from zero. Anything shown to a customer goes through this.
pub fn round_cents(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Convert dollars to cents, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64, DispatchError> {
    let cents = round_cents(amount) * Decimal::ONE_HUNDRED;
    cents
        .to_i64()
        .ok_or(DispatchError::AmountOutOfRange { amount })
}

/// Session mode and amounts for a card checkout.
pub fn checkout_mode(submission: &Submission) -> Result<CheckoutMode, DispatchError> {
    let billing = submission.billing();
    let pricing = submission.pricing();
    let mode = match billing.billing_type {
        BillingType::OneTime => CheckoutMode::Payment,
        BillingType::Deposit => CheckoutMode::DepositPayment,
        BillingType::Setup => CheckoutMode::Setup,
        BillingType::Subscription => {
            let due_cents = to_minor_units(pricing.due_today)?;
            let recurring_cents = to_minor_units(
                pricing.monthly_total * Decimal::from(billing.months_in_term),
            )?;
            CheckoutMode::Subscription {
                interval_months: billing.months_in_term,
                recurring_cents,
                one_time_cents: (due_cents - recurring_cents).max(0),
            }
        }
    };
    Ok(mode)
}

/// Flatten a submission into string pairs for the processor's metadata bag.
pub fn metadata_mirror(submission: &Submission, geo: Option<&GeoPoint>) -> BTreeMap<String, String> {
    let business = submission.business();
    let services = submission.services();
    let billing = submission.billing();
    let pricing = submission.pricing();

    let mut metadata = BTreeMap::new();
    let mut put = |key: &str, value: String| {
        metadata.insert(key.to_string(), value);
    };

    put("order_id", submission.id().as_str().to_string());
    put("biz_name", business.name.clone());
    put("locations", business.locations.to_string());
    put("preferred_service_day", business.preferred_service_day.clone());

    put("trash_cadence", services.trash.cadence.label().to_string());
    put("cans", services.trash.cans.to_string());
    put("tier_price_per_can", services.trash.tier_price_per_can.to_string());
    put("pad_enabled", services.pad.enabled.to_string());
    if let (Some(size), Some(cadence)) = (services.pad.size, services.pad.cadence) {
        put("pad_size", size.label().to_string());
        put("pad_cadence", cadence.label().to_string());
    }
    put("pad_monthly", services.pad.monthly_value.to_string());
    put("deep_clean_enabled", services.deep_clean.enabled.to_string());
    if let Some(level) = services.deep_clean.level {
        put("deep_clean_level", level.label().to_string());
        put("deep_clean_qty", services.deep_clean.qty.to_string());
    }

    put("billing_type", billing.billing_type.label().to_string());
    put("billing_option", billing.option.label().to_string());
    put("term_months", billing.months_in_term.to_string());
    put("one_time_only", billing.one_time_only.to_string());
    put("capture_only", billing.capture_only.to_string());
    put("payment_method", billing.payment_method.label().to_string());
    if let Some(start) = billing.start_date {
        put("start_date", start.to_string());
    }

    put("discount_code", pricing.discount_code.clone());
    put("discount_code_rate", pricing.discount_code_rate.to_string());
    put("location_discount_rate", pricing.location_discount_rate.to_string());
    put("billing_discount_rate", pricing.billing_discount_rate.to_string());
    put("base_monthly", round_cents(pricing.base_monthly).to_string());
    put("monthly_total", round_cents(pricing.monthly_total).to_string());
    put("discount_total", round_cents(pricing.discount_total).to_string());
    put("per_visit_total", round_cents(pricing.per_visit_total).to_string());
    put("deep_clean_total", round_cents(pricing.deep_clean_total).to_string());
    put("due_today", round_cents(pricing.due_today).to_string());
    put("normal_due_today", round_cents(pricing.normal_due_today).to_string());
    put("is_deposit", pricing.is_deposit.to_string());
    put("deposit_amount", round_cents(pricing.deposit_amount).to_string());

    if let Some(point) = geo {
        put("geo_lat", point.lat.to_string());
        put("geo_lng", point.lon.to_string());
    }

    metadata
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub public_origin: String,
    /// Upper bound on each collaborator call.
    pub timeout: Duration,
}

/// Result handed back to the caller after the single collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Checkout {
        session_id: String,
        url: String,
        mode: &'static str,
        amount_cents: i64,
    },
    CashOrder {
        order_id: String,
        status: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Amount too small: {amount_cents} cents is below the processor minimum.")]
    AmountTooSmall { amount_cents: i64 },
    #[error("amount {amount} cannot be expressed in cents")]
    AmountOutOfRange { amount: Decimal },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{collaborator} did not respond within {after:?}")]
    Timeout {
        collaborator: &'static str,
        after: Duration,
    },
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Gateway(error) => error.is_retryable(),
            DispatchError::Store(error) => error.is_retryable(),
            DispatchError::Timeout { .. } => true,
            DispatchError::AmountTooSmall { .. } | DispatchError::AmountOutOfRange { .. } => false,
        }
    }
}

/// Sends a built submission to exactly one of hosted checkout or cash-order persistence.
pub struct CheckoutDispatcher {
    payments: Arc<dyn PaymentGateway>,
    cash_orders: Arc<dyn CashOrderStore>,
    geocoder: Arc<dyn Geocoder>,
    settings: DispatchSettings,
}

impl CheckoutDispatcher {
    pub fn new(
        payments: Arc<dyn PaymentGateway>,
        cash_orders: Arc<dyn CashOrderStore>,
        geocoder: Arc<dyn Geocoder>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            payments,
            cash_orders,
            geocoder,
            settings,
        }
    }

    pub fn geocoder(&self) -> &Arc<dyn Geocoder> {
        &self.geocoder
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub async fn dispatch(&self, submission: &Submission) -> Result<DispatchOutcome, DispatchError> {
        let route = route_for(submission);
        let geo = self.enrich(submission).await;
        debug!(
            order_id = submission.id().as_str(),
            ?route,
            geocoded = geo.is_some(),
            "dispatching submission"
        );

        match route {
            DispatchRoute::CashOrder => {
                let receipt = bounded(
                    "cash order store",
                    self.settings.timeout,
                    self.cash_orders.insert_cash_order(submission, geo.as_ref()),
                )
                .await??;
                info!(order_id = %receipt.order_id, "cash order recorded");
                Ok(DispatchOutcome::CashOrder {
                    order_id: receipt.order_id,
                    status: receipt.status,
                })
            }
            DispatchRoute::HostedCheckout => {
                let request = self.session_request(submission, geo.as_ref())?;
                let mode = request.mode.label();
                let amount_cents = request.amount_cents;
                let session = bounded(
                    "payment gateway",
                    self.settings.timeout,
                    self.payments.create_checkout_session(request),
                )
                .await??;
                info!(
                    order_id = submission.id().as_str(),
                    session_id = %session.id,
                    mode,
                    amount_cents,
                    "checkout session created"
                );
                Ok(DispatchOutcome::Checkout {
                    session_id: session.id,
                    url: session.url,
                    mode,
                    amount_cents,
                })
            }
        }
    }

    /// Build the session request without calling the processor.
    pub fn session_request(
        &self,
        submission: &Submission,
        geo: Option<&GeoPoint>,
    ) -> Result<CheckoutSessionRequest, DispatchError> {
        let mode = checkout_mode(submission)?;
        let amount_cents = to_minor_units(submission.pricing().due_today)?.max(0);
        if mode != CheckoutMode::Setup && amount_cents < MIN_CHARGE_CENTS {
            return Err(DispatchError::AmountTooSmall { amount_cents });
        }

        let business = submission.business();
        let origin = self.settings.public_origin.trim_end_matches('/');
        let email = business.email.trim();
        let description = if business.name.is_empty() {
            "ProCan Client".to_string()
        } else {
            business.name.clone()
        };

        Ok(CheckoutSessionRequest {
            mode,
            amount_cents,
            currency: CURRENCY,
            customer_email: (!email.is_empty()).then(|| email.to_string()),
            product_name: PRODUCT_NAME.to_string(),
            description,
            success_url: format!(
                "{origin}/procan-intake.html?payment=success&session_id={{CHECKOUT_SESSION_ID}}"
            ),
            cancel_url: format!("{origin}/procan-intake.html?payment=cancelled"),
            metadata: metadata_mirror(submission, geo),
            idempotency_key: format!("checkout_{}", submission.id().as_str()),
        })
    }

    /// Best-effort geocode of the service address; any failure means no enrichment.
    async fn enrich(&self, submission: &Submission) -> Option<GeoPoint> {
        let address = submission.business().address.trim();
        if address.is_empty() {
            return None;
        }
        match bounded("geocoder", self.settings.timeout, self.geocoder.best_match(address)).await {
            Ok(Ok(point)) => point,
            Ok(Err(error)) => {
                warn!(%error, "geocoding failed; continuing without coordinates");
                None
            }
            Err(error) => {
                warn!(%error, "geocoding timed out; continuing without coordinates");
                None
            }
        }
    }
}

pub(crate) async fn bounded<F, T>(
    collaborator: &'static str,
    after: Duration,
    call: F,
) -> Result<T, DispatchError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| DispatchError::Timeout {
            collaborator,
            after,
        })
}
