use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::common::*;
use crate::workflows::intake::domain::{
    BillingCadence, BillingSelection, BillingType, DeepCleanLevel, DeepCleanScope, PadCadence,
    PadSize, TrashCadence,
};
use crate::workflows::intake::quote::{check_annual_minimum, compute_quote, QuoteError};

#[test]
fn five_biweekly_cans_on_monthly_billing() {
    let quote = quote(&inputs());

    assert_eq!(quote.trash_per_can, dec!(25));
    assert_eq!(quote.trash_monthly, dec!(125));
    assert_eq!(quote.monthly_total, dec!(125));
    assert_eq!(quote.due_today, dec!(125));
    assert_eq!(quote.normal_due_today, dec!(125));
    assert_eq!(quote.discount_total, Decimal::ZERO);
    assert_eq!(quote.billing_type, BillingType::Subscription);
    assert!(!quote.capture_only);
    assert!(!quote.is_deposit);
}

#[test]
fn annual_gate_boundary() {
    let annual = BillingCadence::Annual;
    assert_eq!(
        check_annual_minimum(annual, dec!(999.99)),
        Err(QuoteError::AnnualMinimumNotMet {
            monthly_total: dec!(999.99)
        })
    );
    assert_eq!(check_annual_minimum(annual, dec!(1000.00)), Ok(()));
    assert_eq!(check_annual_minimum(BillingCadence::Monthly, dec!(10)), Ok(()));
}

#[test]
fn annual_gate_through_the_engine_brackets_one_thousand() {
    // List prices are whole dollars and annual billing takes 10% off, so
    // $999.90 and $1,000.80 are the closest reachable totals on either side.
    let mut below = inputs();
    below.trash.cadence = TrashCadence::Monthly;
    below.trash.can_count = 78;
    below.pad.enabled = true;
    below.pad.size = PadSize::Medium;
    below.pad.cadence = PadCadence::Biweekly;
    below.billing.set_cadence(BillingCadence::Annual);
    assert_eq!(
        compute_quote(&below),
        Err(QuoteError::AnnualMinimumNotMet {
            monthly_total: dec!(999.90)
        })
    );

    let mut above = inputs();
    above.trash.cadence = TrashCadence::Monthly;
    above.trash.can_count = 76;
    above.pad.enabled = true;
    above.pad.size = PadSize::Large;
    above.pad.cadence = PadCadence::Monthly;
    above.billing.set_cadence(BillingCadence::Annual);
    let quote = quote(&above);
    assert_eq!(quote.base_monthly, dec!(1112));
    assert_eq!(quote.monthly_total, dec!(1000.80));
    assert_eq!(quote.due_today, dec!(12009.60));
}

#[test]
fn annual_billing_rejects_small_contracts() {
    let mut small = inputs();
    small.trash.can_count = 50;
    small.billing.set_cadence(BillingCadence::Annual);

    let err = compute_quote(&small).expect_err("900/month is below the annual minimum");
    assert_eq!(
        err.to_string(),
        "Annual prepay requires $1,000+/month contract value."
    );
    assert_eq!(
        err,
        QuoteError::AnnualMinimumNotMet {
            monthly_total: dec!(900)
        }
    );
}

#[test]
fn annual_billing_charges_full_term() {
    let mut large = inputs();
    large.trash.can_count = 60;
    large.pad.enabled = true;
    large.pad.size = PadSize::Large;
    large.pad.cadence = PadCadence::Weekly;
    large.billing.set_cadence(BillingCadence::Annual);

    let quote = quote(&large);
    assert_eq!(quote.base_monthly, dec!(1480));
    assert_eq!(quote.monthly_total, dec!(1332));
    assert_eq!(quote.term_months, 12);
    assert_eq!(quote.normal_due_today, dec!(15984));
    assert_eq!(quote.due_today, dec!(15984));
}

#[test]
fn deposit_overrides_due_today_but_keeps_full_amount() {
    let mut deposit = inputs();
    deposit.trash.can_count = 10;
    deposit.pad.enabled = true;
    deposit.pad.size = PadSize::Small;
    deposit.pad.cadence = PadCadence::Biweekly;
    deposit.locations = 2;
    deposit.deep_clean.enabled = true;
    deposit.deep_clean.level = DeepCleanLevel::Standard;
    deposit.deep_clean.applies_to = DeepCleanScope::SomeCans;
    deposit.deep_clean.quantity = 3;
    deposit.billing.set_deposit_reservation(true);

    let quote = quote(&deposit);
    assert_eq!(quote.monthly_total, dec!(332.5));
    assert_eq!(quote.deep_clean_total, dec!(105));
    assert_eq!(quote.normal_due_today, dec!(437.50));
    assert_eq!(quote.due_today, dec!(25.00));
    assert_eq!(quote.deposit_amount, dec!(25));
    assert!(quote.is_deposit);
    assert!(!quote.capture_only);
    assert_eq!(quote.billing_type, BillingType::Deposit);
}

#[test]
fn future_start_captures_card_without_charging() {
    let mut later = inputs();
    later.billing.set_start_date(Some(tomorrow()));
    let quote = quote(&later);
    assert!(quote.capture_only);
    assert_eq!(quote.due_today, Decimal::ZERO);
    assert_eq!(quote.normal_due_today, dec!(125));
    assert_eq!(quote.billing_type, BillingType::Setup);

    let same_day = super::common::quote(&inputs());
    assert!(!same_day.capture_only);
    assert_eq!(same_day.due_today, same_day.normal_due_today);
}

#[test]
fn deposit_wins_over_future_start() {
    let mut later = inputs();
    later.billing.set_start_date(Some(tomorrow()));
    later.billing.set_deposit_reservation(true);

    let quote = quote(&later);
    assert!(!quote.capture_only);
    assert_eq!(quote.due_today, dec!(25));
    assert_eq!(quote.billing_type, BillingType::Deposit);
}

#[test]
fn one_time_orders_use_biweekly_rate() {
    let mut one_time = one_time_inputs(15);
    one_time.trash.cadence = TrashCadence::Monthly;

    let quote = quote(&one_time);
    assert_eq!(quote.trash_one_time, dec!(345));
    assert_eq!(quote.normal_due_today, dec!(345));
    assert_eq!(quote.due_today, dec!(345));
    assert_eq!(quote.billing_type, BillingType::OneTime);
    assert!(!quote.is_deposit);
    assert!(!quote.capture_only);
}

#[test]
fn one_time_orders_skip_location_and_billing_discounts() {
    let mut one_time = one_time_inputs(15);
    one_time.locations = 7;
    one_time.billing.set_cadence(BillingCadence::Quarterly);
    one_time.promo = promo();
    one_time.deep_clean.enabled = true;
    one_time.deep_clean.level = DeepCleanLevel::Heavy;

    let quote = quote(&one_time);
    assert_eq!(quote.trash_one_time, dec!(345));
    assert_eq!(quote.deep_clean_total, dec!(750));
    assert_eq!(quote.per_visit_total, dec!(317.40));
    assert_eq!(quote.due_today, dec!(1067.40));
    assert_eq!(quote.discount_code.as_deref(), Some("EA2026"));
}

#[test]
fn one_time_orders_never_reserve_deposits() {
    let mut one_time = inputs();
    one_time.billing = BillingSelection::new(BillingCadence::Monthly, true, true, Some(tomorrow()));

    let quote = quote(&one_time);
    assert!(!quote.is_deposit);
    assert!(!quote.capture_only);
    assert_eq!(quote.due_today, dec!(125));
}

#[test]
fn quarterly_billing_discounts_and_multiplies_term() {
    let mut quarterly = inputs();
    quarterly.billing.set_cadence(BillingCadence::Quarterly);
    quarterly.promo = promo();

    let quote = quote(&quarterly);
    assert_eq!(quote.billing_discount_rate, dec!(0.05));
    assert_eq!(quote.monthly_total, dec!(125) * dec!(0.95) * dec!(0.92));
    assert_eq!(quote.normal_due_today, quote.monthly_total * dec!(3));
    assert_eq!(quote.discount_total, dec!(125) - quote.monthly_total);
}

#[test]
fn per_visit_estimate_splits_each_service_by_visits() {
    let mut mixed = inputs();
    mixed.pad.enabled = true;
    mixed.pad.size = PadSize::Small;
    mixed.pad.cadence = PadCadence::Weekly;

    let quote = quote(&mixed);
    assert_eq!(quote.pad_monthly, dec!(150));
    assert_eq!(quote.pad_visits_per_month, 4);
    assert_eq!(quote.per_visit_total, dec!(100));
}

#[test]
fn empty_selections_degrade_to_zero() {
    let mut empty = inputs();
    empty.trash.cadence = TrashCadence::None;
    empty.trash.can_count = 40;

    let quote = quote(&empty);
    assert_eq!(quote.trash_monthly, Decimal::ZERO);
    assert_eq!(quote.trash_per_can, Decimal::ZERO);
    assert_eq!(quote.monthly_total, Decimal::ZERO);
    assert_eq!(quote.per_visit_total, Decimal::ZERO);
    assert_eq!(quote.due_today, Decimal::ZERO);
    assert!(!quote.has_service());
}

#[test]
fn deep_clean_all_cans_follows_can_count() {
    let mut deep = inputs();
    deep.trash.can_count = 8;
    deep.deep_clean.enabled = true;
    deep.deep_clean.level = DeepCleanLevel::Extreme;
    deep.deep_clean.applies_to = DeepCleanScope::AllCans;
    deep.deep_clean.quantity = 2;

    let quote = quote(&deep);
    assert_eq!(quote.deep_clean_total, dec!(600));
    assert_eq!(quote.monthly_total, dec!(200));
    assert_eq!(quote.normal_due_today, dec!(800));
}

#[test]
fn identical_inputs_give_identical_quotes() {
    let mut busy = inputs();
    busy.promo = promo();
    busy.locations = 4;
    busy.pad.enabled = true;

    assert_eq!(quote(&busy), quote(&busy));
}
