use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::events::{parse_event, CompletedSession, EventEnvelope, PaymentEvent};
use super::signature::verify_signature;
use super::WebhookError;
use crate::workflows::collaborators::{
    Notifier, OrderLedger, OrderStatus, OutboundEmail, PaidOrder,
};
use crate::workflows::intake::domain::BillingType;

#[derive(Clone, Default)]
pub struct ConfirmationSettings {
    pub webhook_secret: Option<String>,
    /// Staff address copied on new orders and failed renewals.
    pub staff_inbox: Option<String>,
}

impl std::fmt::Debug for ConfirmationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationSettings")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("staff_inbox", &self.staff_inbox)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Recorded {
        session_id: String,
        order_id: Option<String>,
        first_delivery: bool,
    },
    StatusUpdated {
        subscription_id: String,
        status: OrderStatus,
        rows: usize,
    },
    Ignored {
        kind: String,
    },
}

/// Applies verified processor events to the order ledger.
pub struct ConfirmationHandler {
    ledger: Arc<dyn OrderLedger>,
    notifier: Arc<dyn Notifier>,
    settings: ConfirmationSettings,
}

impl ConfirmationHandler {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        notifier: Arc<dyn Notifier>,
        settings: ConfirmationSettings,
    ) -> Self {
        Self {
            ledger,
            notifier,
            settings,
        }
    }

    /// Verify, decode, and apply one delivery.
    pub async fn receive(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome, WebhookError> {
        let secret = self
            .settings
            .webhook_secret
            .as_deref()
            .ok_or(WebhookError::NotConfigured)?;
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        verify_signature(secret, payload, signature, now)?;

        let envelope = parse_event(payload)?;
        self.apply(envelope, now).await
    }

    pub async fn apply(
        &self,
        envelope: EventEnvelope,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome, WebhookError> {
        let EventEnvelope { id, event } = envelope;
        debug!(event_id = %id, "payment event received");

        match event {
            PaymentEvent::SessionCompleted(session) => self.record_session(session, now).await,
            PaymentEvent::InvoicePaid { subscription_id } => {
                self.update_status(subscription_id, OrderStatus::Active).await
            }
            PaymentEvent::InvoicePaymentFailed {
                subscription_id,
                customer_email,
            } => {
                let outcome = self
                    .update_status(subscription_id.clone(), OrderStatus::PastDue)
                    .await?;
                let text = format!(
                    "A renewal payment failed for subscription {subscription_id}.\nCustomer: {}",
                    customer_email.as_deref().unwrap_or("unknown")
                );
                self.notify(self.staff_recipients(), "ProCan payment failed", text)
                    .await;
                Ok(outcome)
            }
            PaymentEvent::SubscriptionDeleted { subscription_id } => {
                self.update_status(subscription_id, OrderStatus::Cancelled).await
            }
            PaymentEvent::Ignored { kind } => {
                debug!(event_id = %id, kind = %kind, "payment event ignored");
                Ok(ConfirmationOutcome::Ignored { kind })
            }
        }
    }

    async fn record_session(
        &self,
        session: CompletedSession,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome, WebhookError> {
        let first_delivery = self.ledger.order_for_session(&session.id).await?.is_none();
        let order = paid_order(&session, now);
        self.ledger.upsert_paid_order(&order).await?;

        info!(
            session_id = %session.id,
            order_id = order.order_id.as_deref().unwrap_or("-"),
            amount_cents = order.amount_total_cents.unwrap_or_default(),
            first_delivery,
            "checkout session recorded"
        );

        if first_delivery {
            let summary = receipt_text(&order);
            if let Some(email) = order.customer_email.clone() {
                self.notify(vec![email], "Your ProCan order is confirmed", summary.clone())
                    .await;
            }
            let subject = format!(
                "New ProCan order {}",
                order.order_id.as_deref().unwrap_or(&session.id)
            );
            self.notify(self.staff_recipients(), &subject, summary).await;
        }

        Ok(ConfirmationOutcome::Recorded {
            session_id: session.id,
            order_id: order.order_id,
            first_delivery,
        })
    }

    async fn update_status(
        &self,
        subscription_id: String,
        status: OrderStatus,
    ) -> Result<ConfirmationOutcome, WebhookError> {
        let rows = self
            .ledger
            .set_status_by_subscription(&subscription_id, status)
            .await?;
        if rows == 0 {
            warn!(subscription_id = %subscription_id, status = status.label(), "no order matched subscription");
        } else {
            info!(subscription_id = %subscription_id, status = status.label(), rows, "order status updated");
        }
        Ok(ConfirmationOutcome::StatusUpdated {
            subscription_id,
            status,
            rows,
        })
    }

    fn staff_recipients(&self) -> Vec<String> {
        self.settings.staff_inbox.iter().cloned().collect()
    }

    async fn notify(&self, to: Vec<String>, subject: &str, text: String) {
        if to.is_empty() {
            return;
        }
        let email = OutboundEmail {
            to,
            subject: subject.to_string(),
            text,
        };
        if let Err(error) = self.notifier.send(&email).await {
            warn!(%error, subject, "confirmation email failed");
        }
    }
}

fn paid_order(session: &CompletedSession, now: DateTime<Utc>) -> PaidOrder {
    let meta = |key: &str| session.metadata.get(key).map(String::as_str);
    let is_deposit = meta("is_deposit") == Some("true");
    let deposit_amount = if is_deposit {
        meta("deposit_amount").and_then(|raw| raw.parse::<Decimal>().ok())
    } else {
        None
    };

    PaidOrder {
        stripe_session_id: session.id.clone(),
        order_id: session.order_id().map(str::to_string),
        customer_email: session.customer_email.clone(),
        stripe_customer_id: session.customer_id.clone(),
        stripe_subscription_id: session.subscription_id.clone(),
        amount_total_cents: session.amount_total_cents,
        currency: session.currency.clone(),
        billing_type: meta("billing_type").and_then(BillingType::from_label),
        is_deposit,
        deposit_amount,
        status: OrderStatus::Paid,
        paid_at: now,
        metadata: session.metadata.clone(),
    }
}

fn receipt_text(order: &PaidOrder) -> String {
    let meta = |key: &str| order.metadata.get(key).map(String::as_str).unwrap_or("-");
    let charged = order
        .amount_total_cents
        .map(|cents| Decimal::new(cents, 2).to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut lines = vec![
        format!("Order: {}", order.order_id.as_deref().unwrap_or("-")),
        format!("Business: {}", meta("biz_name")),
        format!("Charged today: ${charged}"),
        format!("Billing: {}", meta("billing_type")),
        format!("Monthly total: ${}", meta("monthly_total")),
        format!("Start date: {}", meta("start_date")),
    ];
    if order.is_deposit {
        lines.push(
            "Your deposit is credited toward your first service invoice once your route is scheduled."
                .to_string(),
        );
    }
    lines.join("\n")
}
