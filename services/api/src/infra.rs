use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use procan_intake::config::CollaboratorConfig;
use procan_intake::error::AppError;
use procan_intake::workflows::collaborators::{
    BalanceCredit, CancelTiming, CashOrderReceipt, CashOrderRow, CashOrderStore,
    CheckoutSession, CheckoutSessionRequest, GatewayError, GeoPoint, Geocoder, Notifier,
    OrderLedger, OrderRecord, OrderStatus, OutboundEmail, PaidOrder, PaymentGateway,
    RouteSchedule, StoreError, SubscriptionBilling, TrialEndUpdate,
};
use procan_intake::workflows::gateways::{
    http_client, NominatimGeocoder, ResendNotifier, StripeGateway, SupabaseStore,
};
use procan_intake::workflows::intake::Submission;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Every outbound seam the routers depend on.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub(crate) payments: Arc<dyn PaymentGateway>,
    pub(crate) billing: Arc<dyn SubscriptionBilling>,
    pub(crate) cash_orders: Arc<dyn CashOrderStore>,
    pub(crate) ledger: Arc<dyn OrderLedger>,
    pub(crate) geocoder: Arc<dyn Geocoder>,
    pub(crate) notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// HTTP adapters where credentials exist; in-memory stand-ins otherwise.
    pub(crate) fn from_config(config: &CollaboratorConfig) -> Result<Self, AppError> {
        let client = http_client(config.timeout)?;

        let (payments, billing): (Arc<dyn PaymentGateway>, Arc<dyn SubscriptionBilling>) =
            match &config.stripe {
                Some(stripe) => {
                    let gateway = Arc::new(StripeGateway::new(client.clone(), stripe));
                    (
                        gateway.clone() as Arc<dyn PaymentGateway>,
                        gateway as Arc<dyn SubscriptionBilling>,
                    )
                }
                None => {
                    warn!("STRIPE_SECRET_KEY not set; using in-memory payment processor");
                    let local = Arc::new(InMemoryPayments::new(&config.public_origin));
                    (
                        local.clone() as Arc<dyn PaymentGateway>,
                        local as Arc<dyn SubscriptionBilling>,
                    )
                }
            };

        let (cash_orders, ledger): (Arc<dyn CashOrderStore>, Arc<dyn OrderLedger>) =
            match &config.supabase {
                Some(supabase) => {
                    let store = Arc::new(SupabaseStore::new(
                        client.clone(),
                        supabase,
                        config.public_origin.clone(),
                    ));
                    (
                        store.clone() as Arc<dyn CashOrderStore>,
                        store as Arc<dyn OrderLedger>,
                    )
                }
                None => {
                    warn!("SUPABASE_URL not set; orders are kept in memory");
                    let local = Arc::new(InMemoryOrders::new(&config.public_origin));
                    (
                        local.clone() as Arc<dyn CashOrderStore>,
                        local as Arc<dyn OrderLedger>,
                    )
                }
            };

        let notifier: Arc<dyn Notifier> = match &config.email {
            Some(email) => Arc::new(ResendNotifier::new(client.clone(), email)),
            None => {
                warn!("RESEND_API_KEY not set; emails are logged instead of sent");
                Arc::new(LogNotifier)
            }
        };

        let geocoder: Arc<dyn Geocoder> = Arc::new(NominatimGeocoder::new(client, &config.geocoder));

        Ok(Self {
            payments,
            billing,
            cash_orders,
            ledger,
            geocoder,
            notifier,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Payment processor stand-in: sessions resolve straight to the success page.
pub(crate) struct InMemoryPayments {
    public_origin: String,
    issued: AtomicU64,
    requests: Mutex<Vec<CheckoutSessionRequest>>,
}

impl InMemoryPayments {
    pub(crate) fn new(public_origin: &str) -> Self {
        Self {
            public_origin: public_origin.trim_end_matches('/').to_string(),
            issued: AtomicU64::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn requests(&self) -> Vec<CheckoutSessionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPayments {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let sequence = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("cs_local_{sequence:06}");
        let url = format!(
            "{}/procan-intake.html?payment=success&session_id={id}",
            self.public_origin
        );
        lock(&self.requests).push(request);
        Ok(CheckoutSession { id, url })
    }
}

#[async_trait]
impl SubscriptionBilling for InMemoryPayments {
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        timing: CancelTiming,
    ) -> Result<(), GatewayError> {
        info!(subscription_id, action = timing.label(), "local subscription cancelled");
        Ok(())
    }

    async fn credit_customer_balance(&self, credit: &BalanceCredit) -> Result<(), GatewayError> {
        info!(
            customer_id = %credit.customer_id,
            amount_cents = credit.amount_cents,
            "local balance credit recorded"
        );
        Ok(())
    }

    async fn set_trial_end(&self, update: &TrialEndUpdate) -> Result<(), GatewayError> {
        info!(
            subscription_id = %update.subscription_id,
            trial_end = %update.trial_end,
            "local trial end recorded"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct LocalOrder {
    record: OrderRecord,
    route_id: Option<String>,
}

/// Order store stand-in keyed by order id.
pub(crate) struct InMemoryOrders {
    public_origin: String,
    orders: Mutex<HashMap<String, LocalOrder>>,
    routes: Mutex<Vec<RouteSchedule>>,
}

impl InMemoryOrders {
    pub(crate) fn new(public_origin: &str) -> Self {
        Self {
            public_origin: public_origin.to_string(),
            orders: Mutex::new(HashMap::new()),
            routes: Mutex::new(Vec::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn assign_route(&self, order_id: &str, route_id: &str) -> bool {
        match lock(&self.orders).get_mut(order_id) {
            Some(order) => {
                order.route_id = Some(route_id.to_string());
                true
            }
            None => false,
        }
    }

    pub(crate) fn order(&self, order_id: &str) -> Option<OrderRecord> {
        lock(&self.orders)
            .get(order_id)
            .map(|order| order.record.clone())
    }
}

#[async_trait]
impl CashOrderStore for InMemoryOrders {
    async fn insert_cash_order(
        &self,
        submission: &Submission,
        geo: Option<&GeoPoint>,
    ) -> Result<CashOrderReceipt, StoreError> {
        let row = CashOrderRow::from_submission(submission, geo, &self.public_origin)?;
        let order_id = row
            .order_id
            .clone()
            .unwrap_or_else(|| submission.id().as_str().to_string());
        let record = OrderRecord {
            id: order_id.clone(),
            status: Some(row.status.to_string()),
            ..OrderRecord::default()
        };
        lock(&self.orders).insert(
            order_id.clone(),
            LocalOrder {
                record,
                ..LocalOrder::default()
            },
        );
        Ok(CashOrderReceipt {
            order_id,
            status: row.status.to_string(),
        })
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrders {
    async fn order_for_session(&self, session_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        Ok(lock(&self.orders)
            .values()
            .find(|order| order.record.stripe_session_id.as_deref() == Some(session_id))
            .map(|order| order.record.clone()))
    }

    async fn upsert_paid_order(&self, paid: &PaidOrder) -> Result<(), StoreError> {
        let mut orders = lock(&self.orders);
        let key = paid
            .order_id
            .clone()
            .unwrap_or_else(|| paid.stripe_session_id.clone());
        let entry = orders.entry(key.clone()).or_default();
        entry.record = OrderRecord {
            id: key,
            stripe_session_id: Some(paid.stripe_session_id.clone()),
            stripe_customer_id: paid.stripe_customer_id.clone(),
            stripe_subscription_id: paid.stripe_subscription_id.clone(),
            status: Some(paid.status.label().to_string()),
            deposit_amount: paid.deposit_amount,
            is_deposit: Some(paid.is_deposit),
        };
        Ok(())
    }

    async fn set_status_by_subscription(
        &self,
        subscription_id: &str,
        status: OrderStatus,
    ) -> Result<usize, StoreError> {
        let mut touched = 0;
        for order in lock(&self.orders).values_mut() {
            if order.record.stripe_subscription_id.as_deref() == Some(subscription_id) {
                order.record.status = Some(status.label().to_string());
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.order(order_id))
    }

    async fn mark_cancelled(
        &self,
        order_id: &str,
        status: OrderStatus,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut orders = lock(&self.orders);
        let order = orders.get_mut(order_id).ok_or(StoreError::NotFound)?;
        order.record.status = Some(status.label().to_string());
        info!(order_id, status = status.label(), %cancelled_at, "local order cancelled");
        Ok(())
    }

    async fn save_route_schedule(&self, schedule: &RouteSchedule) -> Result<(), StoreError> {
        let mut routes = lock(&self.routes);
        routes.retain(|existing| existing.route_id != schedule.route_id);
        routes.push(schedule.clone());
        Ok(())
    }

    async fn orders_on_route(&self, route_id: &str) -> Result<Vec<OrderRecord>, StoreError> {
        Ok(lock(&self.orders)
            .values()
            .filter(|order| order.route_id.as_deref() == Some(route_id))
            .map(|order| order.record.clone())
            .collect())
    }
}

/// Email stand-in that writes the message to the log.
pub(crate) struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &OutboundEmail) -> Result<(), GatewayError> {
        info!(to = ?email.to, subject = %email.subject, "email not sent (no provider configured)");
        Ok(())
    }
}
