use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::workflows::collaborators::{
    CashOrderReceipt, CashOrderRow, CashOrderStore, CheckoutSession, CheckoutSessionRequest,
    GatewayError, GeoPoint, Geocoder, PaymentGateway, StoreError,
};
use crate::workflows::intake::discounts::AppliedPromo;
use crate::workflows::intake::domain::{
    BillingCadence, BillingSelection, DeepCleanService, PadService, PaymentMethod, TrashCadence,
    TrashService,
};
use crate::workflows::intake::quote::{compute_quote, Quote, QuoteInputs};
use crate::workflows::intake::submission::{build_submission, ContactFields, Submission};
use crate::workflows::intake::{CheckoutDispatcher, DispatchSettings};

pub(super) const ORIGIN: &str = "https://intake.example.com";

pub(super) fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn today() -> NaiveDate {
    day(2026, 3, 10)
}

pub(super) fn tomorrow() -> NaiveDate {
    day(2026, 3, 11)
}

/// Five biweekly cans, monthly billing, one location, starting today.
pub(super) fn inputs() -> QuoteInputs {
    QuoteInputs {
        trash: TrashService {
            cadence: TrashCadence::Biweekly,
            can_count: 5,
        },
        pad: PadService::default(),
        deep_clean: DeepCleanService::default(),
        locations: 1,
        billing: BillingSelection::new(BillingCadence::Monthly, false, false, Some(today())),
        promo: None,
        today: today(),
    }
}

pub(super) fn one_time_inputs(cans: u32) -> QuoteInputs {
    let mut inputs = inputs();
    inputs.trash.can_count = cans;
    inputs.billing.set_one_time_only(true);
    inputs
}

pub(super) fn promo() -> Option<AppliedPromo> {
    AppliedPromo::lookup("EA2026").expect("registry code")
}

pub(super) fn quote(inputs: &QuoteInputs) -> Quote {
    compute_quote(inputs).expect("quote computes")
}

pub(super) fn contact(payment_method: PaymentMethod) -> ContactFields {
    ContactFields {
        business_name: "Harbor Street Diner".to_string(),
        contact_name: "Sam Ortiz".to_string(),
        phone: "(515) 555-0142".to_string(),
        email: "sam@harborstreet.example".to_string(),
        address: "410 Harbor St, Des Moines, IA".to_string(),
        preferred_service_day: Some("tuesday".to_string()),
        notes: "Gate code 2231".to_string(),
        payment_method,
    }
}

pub(super) fn submission_for(inputs: &QuoteInputs, payment_method: PaymentMethod) -> Submission {
    build_submission(&quote(inputs), &contact(payment_method))
}

pub(super) fn geo_point() -> GeoPoint {
    GeoPoint {
        lat: 41.5868,
        lon: -93.625,
        kind: "house".to_string(),
        display_name: "410 Harbor St".to_string(),
    }
}

#[derive(Default)]
pub(super) struct RecordingPayments {
    pub(super) requests: Mutex<Vec<CheckoutSessionRequest>>,
}

impl RecordingPayments {
    pub(super) fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().expect("payments mutex poisoned").clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingPayments {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let mut guard = self.requests.lock().expect("payments mutex poisoned");
        guard.push(request);
        Ok(CheckoutSession {
            id: format!("cs_test_{}", guard.len()),
            url: "https://checkout.example/pay".to_string(),
        })
    }
}

pub(super) struct FailingPayments {
    pub(super) status: u16,
}

#[async_trait]
impl PaymentGateway for FailingPayments {
    async fn create_checkout_session(
        &self,
        _request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        Err(GatewayError::Rejected {
            service: "stripe",
            status: self.status,
            body: "upstream failure".to_string(),
        })
    }
}

pub(super) struct StalledPayments;

#[async_trait]
impl PaymentGateway for StalledPayments {
    async fn create_checkout_session(
        &self,
        _request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(GatewayError::transport("stripe", "unreachable"))
    }
}

#[derive(Default)]
pub(super) struct RecordingCashStore {
    pub(super) rows: Mutex<Vec<CashOrderRow>>,
}

impl RecordingCashStore {
    pub(super) fn rows(&self) -> Vec<CashOrderRow> {
        self.rows.lock().expect("cash mutex poisoned").clone()
    }
}

#[async_trait]
impl CashOrderStore for RecordingCashStore {
    async fn insert_cash_order(
        &self,
        submission: &Submission,
        geo: Option<&GeoPoint>,
    ) -> Result<CashOrderReceipt, StoreError> {
        let row = CashOrderRow::from_submission(submission, geo, ORIGIN)?;
        self.rows.lock().expect("cash mutex poisoned").push(row);
        Ok(CashOrderReceipt {
            order_id: submission.id().as_str().to_string(),
            status: "new".to_string(),
        })
    }
}

pub(super) struct StaticGeocoder(pub(super) Option<GeoPoint>);

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn best_match(&self, _query: &str) -> Result<Option<GeoPoint>, GatewayError> {
        Ok(self.0.clone())
    }

    async fn suggest(&self, _query: &str, limit: usize) -> Result<Vec<GeoPoint>, GatewayError> {
        Ok(self.0.iter().cloned().cycle().take(limit + 3).collect())
    }
}

pub(super) struct FailingGeocoder;

#[async_trait]
impl Geocoder for FailingGeocoder {
    async fn best_match(&self, _query: &str) -> Result<Option<GeoPoint>, GatewayError> {
        Err(GatewayError::transport("nominatim", "connection refused"))
    }

    async fn suggest(&self, _query: &str, _limit: usize) -> Result<Vec<GeoPoint>, GatewayError> {
        Err(GatewayError::transport("nominatim", "connection refused"))
    }
}

pub(super) fn settings(timeout: Duration) -> DispatchSettings {
    DispatchSettings {
        public_origin: ORIGIN.to_string(),
        timeout,
    }
}

pub(super) fn dispatcher_with(
    payments: Arc<dyn PaymentGateway>,
    cash_orders: Arc<dyn CashOrderStore>,
    geocoder: Arc<dyn Geocoder>,
) -> CheckoutDispatcher {
    CheckoutDispatcher::new(payments, cash_orders, geocoder, settings(Duration::from_secs(2)))
}

pub(super) fn recording_dispatcher() -> (
    CheckoutDispatcher,
    Arc<RecordingPayments>,
    Arc<RecordingCashStore>,
) {
    let payments = Arc::new(RecordingPayments::default());
    let cash = Arc::new(RecordingCashStore::default());
    let dispatcher = dispatcher_with(
        payments.clone(),
        cash.clone(),
        Arc::new(StaticGeocoder(Some(geo_point()))),
    );
    (dispatcher, payments, cash)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
