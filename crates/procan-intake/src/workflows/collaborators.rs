//! Seams to the external services the intake flow depends on.
//!
//! Concrete HTTP adapters live in [`crate::workflows::gateways`]; the API service swaps in
//! in-memory stand-ins when credentials are absent.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::intake::domain::{BillingType, PaymentMethod};
use super::intake::submission::Submission;

/// Hosted payment session creation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;
}

/// Subscription maintenance used by staff operations.
#[async_trait]
pub trait SubscriptionBilling: Send + Sync {
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        timing: CancelTiming,
    ) -> Result<(), GatewayError>;

    async fn credit_customer_balance(&self, credit: &BalanceCredit) -> Result<(), GatewayError>;

    async fn set_trial_end(&self, update: &TrialEndUpdate) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn best_match(&self, query: &str) -> Result<Option<GeoPoint>, GatewayError>;
    async fn suggest(&self, query: &str, limit: usize) -> Result<Vec<GeoPoint>, GatewayError>;
}

/// Persistence for cash/check orders. Implementations build rows with
/// [`CashOrderRow::from_submission`], which refuses recurring submissions.
#[async_trait]
pub trait CashOrderStore: Send + Sync {
    async fn insert_cash_order(
        &self,
        submission: &Submission,
        geo: Option<&GeoPoint>,
    ) -> Result<CashOrderReceipt, StoreError>;
}

/// Order records written by payment confirmations and staff operations.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn order_for_session(&self, session_id: &str) -> Result<Option<OrderRecord>, StoreError>;

    /// Insert or merge on `stripe_session_id`; repeated deliveries land on the same row.
    async fn upsert_paid_order(&self, order: &PaidOrder) -> Result<(), StoreError>;

    /// Returns the number of rows touched.
    async fn set_status_by_subscription(
        &self,
        subscription_id: &str,
        status: OrderStatus,
    ) -> Result<usize, StoreError>;

    async fn fetch_order(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError>;

    async fn mark_cancelled(
        &self,
        order_id: &str,
        status: OrderStatus,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn save_route_schedule(&self, schedule: &RouteSchedule) -> Result<(), StoreError>;

    async fn orders_on_route(&self, route_id: &str) -> Result<Vec<OrderRecord>, StoreError>;
}

/// Transactional email.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },
    #[error("{service} rejected the request ({status}): {body}")]
    Rejected {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} returned an unreadable response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },
}

impl GatewayError {
    /// Transport failures, throttling, and upstream 5xx are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport { .. } => true,
            GatewayError::Rejected { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Decode { .. } | GatewayError::NotConfigured { .. } => false,
        }
    }

    pub(crate) fn transport(service: &'static str, error: impl std::fmt::Display) -> Self {
        GatewayError::Transport {
            service,
            message: error.to_string(),
        }
    }

    pub(crate) fn decode(service: &'static str, error: impl std::fmt::Display) -> Self {
        GatewayError::Decode {
            service,
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Cash/Check is only allowed for one-time service.")]
    CashRequiresOneTime,
    #[error("order not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] GatewayError),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Backend(error) => error.is_retryable(),
            StoreError::CashRequiresOneTime | StoreError::NotFound => false,
        }
    }
}

/// How the processor should treat the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CheckoutMode {
    /// Charge `amount_cents` once.
    Payment,
    /// Charge the deposit and keep the card on file for off-session charges.
    DepositPayment,
    /// Save the card without charging.
    Setup,
    /// Recurring charge every `interval_months`, plus any one-time remainder on the first invoice.
    Subscription {
        interval_months: u32,
        recurring_cents: i64,
        one_time_cents: i64,
    },
}

impl CheckoutMode {
    pub const fn label(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::DepositPayment => "deposit_payment",
            CheckoutMode::Setup => "setup",
            CheckoutMode::Subscription { .. } => "subscription",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSessionRequest {
    pub mode: CheckoutMode,
    pub amount_cents: i64,
    pub currency: &'static str,
    pub customer_email: Option<String>,
    pub product_name: String,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Every quote figure, keyed for reconciliation when the confirmation event arrives.
    pub metadata: BTreeMap<String, String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTiming {
    Immediately,
    AtPeriodEnd,
}

impl CancelTiming {
    pub const fn label(self) -> &'static str {
        match self {
            CancelTiming::Immediately => "cancel_now",
            CancelTiming::AtPeriodEnd => "cancel_at_period_end",
        }
    }
}

/// Credit applied against a customer's next invoice. `amount_cents` is positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceCredit {
    pub customer_id: String,
    pub amount_cents: i64,
    pub description: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialEndUpdate {
    pub subscription_id: String,
    pub trial_end: DateTime<Utc>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashOrderReceipt {
    pub order_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Paid,
    Active,
    PastDue,
    Cancelled,
    CancelledBeforeStart,
    CancelledActive,
}

impl OrderStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Paid => "paid",
            OrderStatus::Active => "active",
            OrderStatus::PastDue => "past_due",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::CancelledBeforeStart => "cancelled_before_start",
            OrderStatus::CancelledActive => "cancelled_active",
        }
    }
}

/// Paid order as reported by a completed checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaidOrder {
    pub stripe_session_id: String,
    pub order_id: Option<String>,
    pub customer_email: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub amount_total_cents: Option<i64>,
    pub currency: Option<String>,
    pub billing_type: Option<BillingType>,
    pub is_deposit: bool,
    pub deposit_amount: Option<Decimal>,
    pub status: OrderStatus,
    pub paid_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
}

/// Subset of an order row read back by staff operations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    #[serde(default)]
    pub stripe_session_id: Option<String>,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub deposit_amount: Option<Decimal>,
    #[serde(default)]
    pub is_deposit: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteCadence {
    Weekly,
    #[default]
    Biweekly,
    Monthly,
}

impl RouteCadence {
    pub const fn label(self) -> &'static str {
        match self {
            RouteCadence::Weekly => "weekly",
            RouteCadence::Biweekly => "biweekly",
            RouteCadence::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSchedule {
    pub route_id: String,
    pub service_start_date: NaiveDate,
    pub cadence: RouteCadence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

const ELLIPSIS: char = '\u{2026}';

/// Trim and cap a free-text field; blank values become `None`.
pub(crate) fn capped(value: &str, max_chars: usize) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() <= max_chars {
        return Some(trimmed.to_string());
    }
    let mut shortened: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
    shortened.push(ELLIPSIS);
    Some(shortened)
}

fn non_zero(amount: Decimal) -> Option<Decimal> {
    (!amount.is_zero()).then_some(amount)
}

/// Row written for a cash/check order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashOrderRow {
    pub stripe_session_id: Option<String>,
    pub order_id: Option<String>,
    pub biz_name: Option<String>,
    pub contact_name: Option<String>,
    pub customer_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub locations_count: u32,
    pub preferred_service_day: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub payment_method: &'static str,
    pub billing_type: &'static str,
    pub billing: Option<String>,
    pub term_months: Option<u32>,
    pub cadence: Option<String>,
    pub cans: u32,
    pub pad_enabled: bool,
    pub pad_size: Option<String>,
    pub pad_cadence: Option<String>,
    pub deep_clean_enabled: bool,
    pub deep_clean_level: Option<String>,
    pub deep_clean_qty: Option<u32>,
    pub deep_clean_total: Option<Decimal>,
    pub discount_code: Option<String>,
    pub monthly_total: Option<Decimal>,
    pub due_today: Option<Decimal>,
    pub terms_url: Option<String>,
    pub status: &'static str,
    pub geo_lat: Option<f64>,
    pub geo_lng: Option<f64>,
    pub geo_source: Option<&'static str>,
    pub geo_accuracy: Option<String>,
}

impl CashOrderRow {
    pub fn from_submission(
        submission: &Submission,
        geo: Option<&GeoPoint>,
        public_origin: &str,
    ) -> Result<Self, StoreError> {
        let billing = submission.billing();
        if !billing.one_time_only {
            return Err(StoreError::CashRequiresOneTime);
        }

        let business = submission.business();
        let services = submission.services();
        let pricing = submission.pricing();
        let terms_url = format!("{}/terms.html", public_origin.trim_end_matches('/'));

        Ok(Self {
            stripe_session_id: None,
            order_id: capped(submission.id().as_str(), 80),
            biz_name: capped(&business.name, 200),
            contact_name: capped(&business.contact_name, 200),
            customer_email: capped(&business.email, 200),
            phone: capped(&business.phone, 60),
            address: capped(&business.address, 300),
            locations_count: business.locations,
            preferred_service_day: capped(&business.preferred_service_day, 40),
            start_date: billing.start_date,
            notes: capped(submission.notes(), 1000),
            payment_method: PaymentMethod::Cash.label(),
            billing_type: BillingType::OneTime.label(),
            billing: capped(billing.option.label(), 40),
            term_months: None,
            cadence: capped(services.trash.cadence.label(), 40),
            cans: services.trash.cans,
            pad_enabled: services.pad.enabled,
            pad_size: services.pad.size.and_then(|size| capped(size.label(), 40)),
            pad_cadence: services
                .pad
                .cadence
                .and_then(|cadence| capped(cadence.label(), 40)),
            deep_clean_enabled: services.deep_clean.enabled,
            deep_clean_level: services
                .deep_clean
                .level
                .and_then(|level| capped(level.label(), 40)),
            deep_clean_qty: services
                .deep_clean
                .enabled
                .then_some(services.deep_clean.qty),
            deep_clean_total: non_zero(pricing.deep_clean_total),
            discount_code: capped(&pricing.discount_code, 60),
            monthly_total: non_zero(pricing.monthly_total),
            due_today: non_zero(pricing.due_today),
            terms_url: capped(&terms_url, 500),
            status: OrderStatus::New.label(),
            geo_lat: geo.map(|point| point.lat),
            geo_lng: geo.map(|point| point.lon),
            geo_source: geo.map(|_| "nominatim"),
            geo_accuracy: geo.and_then(|point| capped(&point.kind, 40)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_trims_and_marks_truncation() {
        assert_eq!(capped("   ", 10), None);
        assert_eq!(capped("  Acme  ", 10).as_deref(), Some("Acme"));
        let long = "x".repeat(65);
        let shortened = capped(&long, 60).expect("non-empty");
        assert_eq!(shortened.chars().count(), 60);
        assert!(shortened.ends_with(ELLIPSIS));
    }

    #[test]
    fn retryable_classification() {
        let throttled = GatewayError::Rejected {
            service: "stripe",
            status: 429,
            body: String::new(),
        };
        let bad_request = GatewayError::Rejected {
            service: "stripe",
            status: 400,
            body: String::new(),
        };
        assert!(throttled.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(GatewayError::transport("supabase", "connection reset").is_retryable());
        assert!(!StoreError::CashRequiresOneTime.is_retryable());
        assert!(StoreError::Backend(GatewayError::Rejected {
            service: "supabase",
            status: 503,
            body: String::new(),
        })
        .is_retryable());
    }
}
