use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{FulfillmentError, FulfillmentService};
use crate::workflows::collaborators::{
    BalanceCredit, OrderRecord, RouteCadence, RouteSchedule, TrialEndUpdate,
};
use crate::workflows::intake::checkout::to_minor_units;

/// Deposit credited when an order row does not record one.
pub const DEFAULT_DEPOSIT: Decimal = dec!(25);

/// Billing starts at 15:00 UTC on the first service day, clear of midnight in US zones.
const FIRST_CHARGE_UTC: (u32, u32) = (15, 0);

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default)]
    pub route_id: String,
    #[serde(default)]
    pub service_start_date: String,
    #[serde(default)]
    pub cadence: Option<RouteCadence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderFailure {
    pub order_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    pub ok: bool,
    pub route_id: String,
    pub service_start_date: NaiveDate,
    pub cadence: RouteCadence,
    pub updated_subscriptions: usize,
    pub deposit_credits_applied: usize,
    pub errors: Vec<OrderFailure>,
}

impl ScheduleRequest {
    fn validate(&self) -> Result<RouteSchedule, FulfillmentError> {
        let route_id = self.route_id.trim();
        if route_id.is_empty() {
            return Err(FulfillmentError::InvalidRequest(
                "Missing route_id".to_string(),
            ));
        }
        let raw = self.service_start_date.trim();
        if raw.is_empty() {
            return Err(FulfillmentError::InvalidRequest(
                "Missing service_start_date".to_string(),
            ));
        }
        let day = raw.get(..10).unwrap_or(raw);
        let service_start_date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| {
            FulfillmentError::InvalidRequest("Invalid service_start_date".to_string())
        })?;

        Ok(RouteSchedule {
            route_id: route_id.to_string(),
            service_start_date,
            cadence: self.cadence.unwrap_or_default(),
        })
    }
}

/// Instant the first subscription invoice is charged for a route starting on `day`.
pub fn first_charge_at(day: NaiveDate) -> DateTime<Utc> {
    let (hour, minute) = FIRST_CHARGE_UTC;
    day.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN))
        .and_utc()
}

#[derive(Debug, Default)]
struct OrderProgress {
    credited: bool,
    trial_set: bool,
}

impl FulfillmentService {
    /// Persist a route's start date and move each subscribed order's first charge onto it.
    pub async fn schedule_route(
        &self,
        request: &ScheduleRequest,
    ) -> Result<ScheduleReport, FulfillmentError> {
        let schedule = request.validate()?;
        self.ledger.save_route_schedule(&schedule).await?;
        let orders = self.ledger.orders_on_route(&schedule.route_id).await?;

        let mut report = ScheduleReport {
            ok: true,
            route_id: schedule.route_id.clone(),
            service_start_date: schedule.service_start_date,
            cadence: schedule.cadence,
            updated_subscriptions: 0,
            deposit_credits_applied: 0,
            errors: Vec::new(),
        };

        for order in &orders {
            let mut progress = OrderProgress::default();
            if let Err(error) = self.reschedule_order(&schedule, order, &mut progress).await {
                warn!(order_id = %order.id, %error, "route scheduling failed for order");
                report.errors.push(OrderFailure {
                    order_id: order.id.clone(),
                    message: error.to_string(),
                });
            }
            report.deposit_credits_applied += usize::from(progress.credited);
            report.updated_subscriptions += usize::from(progress.trial_set);
        }

        info!(
            route_id = %report.route_id,
            orders = orders.len(),
            updated_subscriptions = report.updated_subscriptions,
            deposit_credits_applied = report.deposit_credits_applied,
            errors = report.errors.len(),
            "route scheduled"
        );
        Ok(report)
    }

    async fn reschedule_order(
        &self,
        schedule: &RouteSchedule,
        order: &OrderRecord,
        progress: &mut OrderProgress,
    ) -> Result<(), FulfillmentError> {
        let non_blank = |value: &Option<String>| value.clone().filter(|id| !id.trim().is_empty());
        let (Some(subscription_id), Some(customer_id)) = (
            non_blank(&order.stripe_subscription_id),
            non_blank(&order.stripe_customer_id),
        ) else {
            return Ok(());
        };
        let route_id = &schedule.route_id;

        let deposit = order
            .deposit_amount
            .filter(|amount| *amount > Decimal::ZERO)
            .unwrap_or(DEFAULT_DEPOSIT);
        let amount_cents = to_minor_units(deposit)
            .map_err(|error| FulfillmentError::InvalidRequest(error.to_string()))?;
        if amount_cents > 0 {
            self.billing
                .credit_customer_balance(&BalanceCredit {
                    customer_id,
                    amount_cents,
                    description: format!("ProCan deposit credit for route {route_id}"),
                    idempotency_key: format!("route_{route_id}_order_{}_depositcredit", order.id),
                })
                .await?;
            progress.credited = true;
        }

        let start = schedule.service_start_date;
        self.billing
            .set_trial_end(&TrialEndUpdate {
                trial_end: first_charge_at(start),
                idempotency_key: format!("route_{route_id}_sub_{subscription_id}_trialend_{start}"),
                subscription_id,
            })
            .await?;
        progress.trial_set = true;
        Ok(())
    }
}
