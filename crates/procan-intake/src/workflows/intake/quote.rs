//! Quote engine: turns one immutable set of intake selections into a full price breakdown.
//!
//! Every figure shown to the customer and later sent to the payment processor comes from
//! [`Quote`]; callers never recompute any of these values on their own.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::discounts::{apply_discounts, AppliedPromo};
use super::domain::{
    BillingCadence, BillingSelection, BillingType, DeepCleanLevel, DeepCleanScope,
    DeepCleanService, PadCadence, PadService, PadSize, TrashCadence, TrashService,
};
use super::pricing::{
    can_tiers, deep_clean_per_can, pad_monthly_price, price_for_quantity, ANNUAL_MINIMUM_MONTHLY,
    BIWEEKLY_CAN_TIERS, DEPOSIT_AMOUNT,
};

/// Everything the engine needs for one evaluation, with no presentation state mixed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteInputs {
    pub trash: TrashService,
    pub pad: PadService,
    pub deep_clean: DeepCleanService,
    pub locations: u32,
    pub billing: BillingSelection,
    pub promo: Option<AppliedPromo>,
    /// Local calendar date used to decide whether the start date is in the future.
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    #[error("Annual prepay requires $1,000+/month contract value.")]
    AnnualMinimumNotMet { monthly_total: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PadLine {
    pub size: PadSize,
    pub cadence: PadCadence,
    pub monthly: Decimal,
    pub visits_per_month: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeepCleanLine {
    pub level: DeepCleanLevel,
    pub applies_to: DeepCleanScope,
    /// Quantity the customer typed for `some_cans`, kept for the order record.
    pub requested_quantity: u32,
    pub cans: u32,
    pub per_can: Decimal,
    pub total: Decimal,
}

/// Complete, internally consistent price breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub trash_cadence: TrashCadence,
    pub can_count: u32,
    pub trash_per_can: Decimal,
    pub trash_monthly: Decimal,
    pub trash_visits_per_month: u32,
    pub pad: Option<PadLine>,
    pub pad_monthly: Decimal,
    pub pad_visits_per_month: u32,
    pub deep_clean: Option<DeepCleanLine>,
    pub deep_clean_total: Decimal,

    pub locations: u32,
    pub billing_cadence: BillingCadence,
    pub term_months: u32,
    pub start_date: Option<NaiveDate>,
    pub one_time_only: bool,

    pub discount_code: Option<String>,
    pub promo_rate: Decimal,
    pub location_discount_rate: Decimal,
    pub billing_discount_rate: Decimal,
    pub base_monthly: Decimal,
    pub monthly_total: Decimal,
    pub discount_total: Decimal,

    pub trash_one_time: Decimal,
    pub pad_one_time: Decimal,
    pub per_visit_total: Decimal,

    pub due_today: Decimal,
    pub normal_due_today: Decimal,
    pub is_deposit: bool,
    pub deposit_amount: Decimal,
    pub capture_only: bool,
    pub billing_type: BillingType,
}

impl Quote {
    pub fn has_service(&self) -> bool {
        self.trash_monthly > Decimal::ZERO || self.pad.is_some()
    }
}

pub fn compute_quote(inputs: &QuoteInputs) -> Result<Quote, QuoteError> {
    let QuoteInputs {
        trash,
        pad,
        deep_clean,
        locations,
        billing,
        promo,
        today,
    } = inputs;

    let locations = (*locations).max(1);
    let billing_cadence = billing.cadence();
    let one_time_only = billing.one_time_only();
    let is_deposit = billing.deposit_reservation() && !one_time_only;
    let capture_only = billing.capture_only(*today);
    let promo_rate = promo
        .as_ref()
        .map(|promo| promo.rate)
        .unwrap_or(Decimal::ZERO);

    let serviced_cans = trash.active_cans();
    let (trash_per_can, trash_monthly, trash_visits_per_month) = if serviced_cans > 0 {
        let per_can = price_for_quantity(can_tiers(trash.cadence), serviced_cans);
        (
            per_can,
            per_can * Decimal::from(serviced_cans),
            trash.cadence.visits_per_month(),
        )
    } else {
        (Decimal::ZERO, Decimal::ZERO, 0)
    };

    let pad_line = pad.enabled.then(|| PadLine {
        size: pad.size,
        cadence: pad.cadence,
        monthly: pad_monthly_price(pad.size, pad.cadence),
        visits_per_month: pad.cadence.visits_per_month(),
    });
    let (pad_monthly, pad_visits_per_month) = pad_line
        .as_ref()
        .map(|line| (line.monthly, line.visits_per_month))
        .unwrap_or((Decimal::ZERO, 0));

    let base_monthly = trash_monthly + pad_monthly;
    let discounts = apply_discounts(base_monthly, locations, billing_cadence, promo_rate);
    let monthly_total = discounts.monthly_total;
    let promo_rate = discounts.promo_rate;

    check_annual_minimum(billing_cadence, monthly_total)?;

    let deep_clean_line = deep_clean.enabled.then(|| {
        let cans = deep_clean.covered_cans(trash.can_count);
        let per_can = deep_clean_per_can(deep_clean.level);
        DeepCleanLine {
            level: deep_clean.level,
            applies_to: deep_clean.applies_to,
            requested_quantity: deep_clean.quantity,
            cans,
            per_can,
            total: per_can * Decimal::from(cans),
        }
    });
    let deep_clean_total = deep_clean_line
        .as_ref()
        .map(|line| line.total)
        .unwrap_or(Decimal::ZERO);

    let term_months = billing_cadence.term_months();
    let promo_factor = Decimal::ONE - promo_rate;

    let (trash_one_time, pad_one_time, per_visit_total, normal_due_today) = if one_time_only {
        // One-time visits are priced off the biweekly table whatever cadence was picked.
        let trash_one_time = if serviced_cans > 0 {
            price_for_quantity(BIWEEKLY_CAN_TIERS, serviced_cans) * Decimal::from(serviced_cans)
        } else {
            Decimal::ZERO
        };
        let pad_one_time = pad_monthly;
        let service_total = (trash_one_time + pad_one_time) * promo_factor;
        (
            trash_one_time,
            pad_one_time,
            service_total,
            service_total + deep_clean_total,
        )
    } else {
        let per_visit = (per_visit_share(trash_monthly, trash_visits_per_month)
            + per_visit_share(pad_monthly, pad_visits_per_month))
            * promo_factor;
        (
            Decimal::ZERO,
            Decimal::ZERO,
            per_visit,
            monthly_total * Decimal::from(term_months) + deep_clean_total,
        )
    };

    let mut due_today = normal_due_today;
    if is_deposit {
        due_today = DEPOSIT_AMOUNT;
    }
    if capture_only {
        due_today = Decimal::ZERO;
    }

    let billing_type = if one_time_only {
        BillingType::OneTime
    } else if is_deposit {
        BillingType::Deposit
    } else if capture_only {
        BillingType::Setup
    } else {
        BillingType::Subscription
    };

    Ok(Quote {
        trash_cadence: trash.cadence,
        can_count: trash.can_count,
        trash_per_can,
        trash_monthly,
        trash_visits_per_month,
        pad: pad_line,
        pad_monthly,
        pad_visits_per_month,
        deep_clean: deep_clean_line,
        deep_clean_total,
        locations,
        billing_cadence,
        term_months,
        start_date: billing.start_date(),
        one_time_only,
        discount_code: promo.as_ref().map(|promo| promo.code.clone()),
        promo_rate,
        location_discount_rate: discounts.location_rate,
        billing_discount_rate: discounts.billing_rate,
        base_monthly,
        monthly_total,
        discount_total: discounts.discount_total,
        trash_one_time,
        pad_one_time,
        per_visit_total,
        due_today,
        normal_due_today,
        is_deposit,
        deposit_amount: if is_deposit {
            DEPOSIT_AMOUNT
        } else {
            Decimal::ZERO
        },
        capture_only,
        billing_type,
    })
}

/// Annual prepay is only offered on contracts worth at least $1,000 a month after discounts.
pub fn check_annual_minimum(
    cadence: BillingCadence,
    monthly_total: Decimal,
) -> Result<(), QuoteError> {
    if cadence == BillingCadence::Annual && monthly_total < ANNUAL_MINIMUM_MONTHLY {
        return Err(QuoteError::AnnualMinimumNotMet { monthly_total });
    }
    Ok(())
}

fn per_visit_share(monthly: Decimal, visits_per_month: u32) -> Decimal {
    if monthly > Decimal::ZERO && visits_per_month > 0 {
        monthly / Decimal::from(visits_per_month)
    } else {
        Decimal::ZERO
    }
}
