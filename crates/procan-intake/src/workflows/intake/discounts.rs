use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use super::domain::BillingCadence;

/// Upper bound on any promo rate, regardless of what the registry says.
pub const MAX_PROMO_RATE: Decimal = dec!(0.90);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percent,
}

/// Registry entry for a promo code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountCode {
    pub code: &'static str,
    pub kind: DiscountKind,
    pub rate: Decimal,
    pub label: &'static str,
}

pub const DISCOUNT_CODES: &[DiscountCode] = &[DiscountCode {
    code: "EA2026",
    kind: DiscountKind::Percent,
    rate: dec!(0.08),
    label: "Code applied (8% off)",
}];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscountError {
    #[error("Invalid discount code.")]
    UnknownCode { code: String },
}

/// A promo code that passed registry lookup, with its rate already clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedPromo {
    pub code: String,
    pub rate: Decimal,
    pub label: String,
}

impl AppliedPromo {
    /// Resolve a raw code against the registry. Blank input resolves to no promo.
    pub fn lookup(raw: &str) -> Result<Option<Self>, DiscountError> {
        Self::lookup_in(DISCOUNT_CODES, raw)
    }

    pub fn lookup_in(registry: &[DiscountCode], raw: &str) -> Result<Option<Self>, DiscountError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Ok(None);
        }

        let entry = registry
            .iter()
            .find(|entry| entry.code == code)
            .ok_or_else(|| DiscountError::UnknownCode { code: code.clone() })?;

        let rate = match entry.kind {
            DiscountKind::Percent => clamp_promo_rate(entry.rate),
        };

        Ok(Some(Self {
            code,
            rate,
            label: entry.label.to_string(),
        }))
    }
}

/// Replace `current` with the promo resolved from `raw`.
///
/// An unknown code leaves `current` untouched; a blank code clears it.
pub fn apply_promo_code(current: &mut Option<AppliedPromo>, raw: &str) -> Result<(), DiscountError> {
    let resolved = AppliedPromo::lookup(raw)?;
    *current = resolved;
    Ok(())
}

pub fn clamp_promo_rate(rate: Decimal) -> Decimal {
    rate.max(Decimal::ZERO).min(MAX_PROMO_RATE)
}

/// Step discount for customers with several service locations.
pub fn location_discount(location_count: u32) -> Decimal {
    match location_count {
        0..=1 => Decimal::ZERO,
        2..=3 => dec!(0.05),
        4..=6 => dec!(0.08),
        _ => dec!(0.10),
    }
}

pub fn billing_discount(cadence: BillingCadence) -> Decimal {
    match cadence {
        BillingCadence::Monthly => Decimal::ZERO,
        BillingCadence::Quarterly => dec!(0.05),
        BillingCadence::Annual => dec!(0.10),
    }
}

/// Itemized result of running a base monthly amount through the discount stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiscountBreakdown {
    pub base_monthly: Decimal,
    pub location_rate: Decimal,
    pub billing_rate: Decimal,
    pub promo_rate: Decimal,
    pub after_location: Decimal,
    pub after_billing: Decimal,
    pub monthly_total: Decimal,
    pub discount_total: Decimal,
}

/// Apply location, then billing cadence, then promo discounts, in that order.
pub fn apply_discounts(
    base_monthly: Decimal,
    location_count: u32,
    billing_cadence: BillingCadence,
    promo_rate: Decimal,
) -> DiscountBreakdown {
    let location_rate = location_discount(location_count);
    let billing_rate = billing_discount(billing_cadence);
    let promo_rate = clamp_promo_rate(promo_rate);

    let after_location = base_monthly * (Decimal::ONE - location_rate);
    let after_billing = after_location * (Decimal::ONE - billing_rate);
    let monthly_total = after_billing * (Decimal::ONE - promo_rate);

    DiscountBreakdown {
        base_monthly,
        location_rate,
        billing_rate,
        promo_rate,
        after_location,
        after_billing,
        monthly_total,
        discount_total: (base_monthly - monthly_total).max(Decimal::ZERO),
    }
}
