use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::WebhookError;

/// Completed hosted checkout, as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletedSession {
    pub id: String,
    pub customer_email: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub amount_total_cents: Option<i64>,
    pub currency: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl CompletedSession {
    pub fn order_id(&self) -> Option<&str> {
        self.metadata.get("order_id").map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    SessionCompleted(CompletedSession),
    InvoicePaid {
        subscription_id: String,
    },
    InvoicePaymentFailed {
        subscription_id: String,
        customer_email: Option<String>,
    },
    SubscriptionDeleted {
        subscription_id: String,
    },
    /// Anything else the processor sends; acknowledged without side effects.
    Ignored {
        kind: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub id: String,
    pub event: PaymentEvent,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: Value,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    id: String,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<RawCustomerDetails>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawCustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInvoice {
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
}

fn object<T: serde::de::DeserializeOwned>(kind: &str, value: Value) -> Result<T, WebhookError> {
    serde_json::from_value(value)
        .map_err(|error| WebhookError::InvalidPayload(format!("{kind}: {error}")))
}

/// Decode a verified delivery body.
pub fn parse_event(payload: &[u8]) -> Result<EventEnvelope, WebhookError> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|error| WebhookError::InvalidPayload(error.to_string()))?;
    let kind = raw.kind.as_str();

    let event = match kind {
        "checkout.session.completed" => {
            let session: RawSession = object(kind, raw.data.object)?;
            let customer_email = session
                .customer_email
                .filter(|email| !email.trim().is_empty())
                .or_else(|| session.customer_details.and_then(|details| details.email));
            PaymentEvent::SessionCompleted(CompletedSession {
                id: session.id,
                customer_email,
                customer_id: session.customer,
                subscription_id: session.subscription,
                amount_total_cents: session.amount_total,
                currency: session.currency,
                metadata: session.metadata,
            })
        }
        "invoice.paid" | "invoice.payment_failed" => {
            let invoice: RawInvoice = object(kind, raw.data.object)?;
            match invoice.subscription {
                // One-off invoices carry no subscription and leave order status alone.
                None => PaymentEvent::Ignored {
                    kind: raw.kind.clone(),
                },
                Some(subscription_id) if kind == "invoice.paid" => {
                    PaymentEvent::InvoicePaid { subscription_id }
                }
                Some(subscription_id) => PaymentEvent::InvoicePaymentFailed {
                    subscription_id,
                    customer_email: invoice.customer_email,
                },
            }
        }
        "customer.subscription.deleted" => {
            let subscription: RawSubscription = object(kind, raw.data.object)?;
            PaymentEvent::SubscriptionDeleted {
                subscription_id: subscription.id,
            }
        }
        _ => PaymentEvent::Ignored {
            kind: raw.kind.clone(),
        },
    };

    Ok(EventEnvelope { id: raw.id, event })
}
