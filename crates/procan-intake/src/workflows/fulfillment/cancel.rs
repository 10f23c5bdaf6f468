use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use super::{FulfillmentError, FulfillmentService};
use crate::workflows::collaborators::{CancelTiming, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelMode {
    /// Route has not started; any deposit is forfeited and billing stops immediately.
    #[default]
    BeforeStart,
    AfterStart,
}

impl CancelMode {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("after_start") {
            CancelMode::AfterStart
        } else {
            CancelMode::BeforeStart
        }
    }

    pub const fn resulting_status(self) -> OrderStatus {
        match self {
            CancelMode::BeforeStart => OrderStatus::CancelledBeforeStart,
            CancelMode::AfterStart => OrderStatus::CancelledActive,
        }
    }
}

fn lenient_mode<'de, D>(deserializer: D) -> Result<CancelMode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(CancelMode::parse).unwrap_or_default())
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub order_id: String,
    #[serde(default, deserialize_with = "lenient_mode")]
    pub mode: CancelMode,
    #[serde(default = "default_true")]
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelReceipt {
    pub ok: bool,
    pub order_id: String,
    pub mode: CancelMode,
    pub stripe_action: &'static str,
    pub status: OrderStatus,
}

impl CancelRequest {
    /// Billing action for an order that has a subscription.
    pub fn timing(&self) -> CancelTiming {
        match self.mode {
            CancelMode::AfterStart if self.cancel_at_period_end => CancelTiming::AtPeriodEnd,
            _ => CancelTiming::Immediately,
        }
    }
}

impl FulfillmentService {
    /// Stop billing for an order and mark it cancelled. Processor history is kept.
    pub async fn cancel_order(
        &self,
        request: &CancelRequest,
        now: DateTime<Utc>,
    ) -> Result<CancelReceipt, FulfillmentError> {
        let order_id = request.order_id.trim();
        if order_id.is_empty() {
            return Err(FulfillmentError::InvalidRequest(
                "Missing order_id".to_string(),
            ));
        }

        let order = self
            .ledger
            .fetch_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound)?;

        let mut stripe_action = "none";
        if let Some(subscription_id) = order
            .stripe_subscription_id
            .as_deref()
            .filter(|id| !id.is_empty())
        {
            let timing = request.timing();
            self.billing
                .cancel_subscription(subscription_id, timing)
                .await?;
            stripe_action = timing.label();
        }

        let status = request.mode.resulting_status();
        self.ledger.mark_cancelled(order_id, status, now).await?;
        info!(order_id, stripe_action, status = status.label(), "order cancelled");

        Ok(CancelReceipt {
            ok: true,
            order_id: order_id.to_string(),
            mode: request.mode,
            stripe_action,
            status,
        })
    }
}
