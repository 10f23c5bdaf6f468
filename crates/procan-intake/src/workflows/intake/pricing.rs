//! Compiled-in price menu and the tier lookup used by the quote engine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::domain::{DeepCleanLevel, PadCadence, PadSize, TrashCadence};

/// Inclusive quantity range with its per-unit monthly price. `max: None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceTier {
    pub min: u32,
    pub max: Option<u32>,
    pub unit_price: Decimal,
}

impl PriceTier {
    pub const fn new(min: u32, max: Option<u32>, unit_price: Decimal) -> Self {
        Self {
            min,
            max,
            unit_price,
        }
    }

    pub fn contains(&self, quantity: u32) -> bool {
        quantity >= self.min && self.max.map(|max| quantity <= max).unwrap_or(true)
    }
}

pub const BIWEEKLY_CAN_TIERS: &[PriceTier] = &[
    PriceTier::new(1, Some(10), dec!(25)),
    PriceTier::new(11, Some(20), dec!(23)),
    PriceTier::new(21, Some(50), dec!(20)),
    PriceTier::new(51, Some(100), dec!(18)),
    PriceTier::new(101, None, dec!(16)),
];

pub const MONTHLY_CAN_TIERS: &[PriceTier] = &[
    PriceTier::new(1, Some(10), dec!(18)),
    PriceTier::new(11, Some(20), dec!(16)),
    PriceTier::new(21, Some(50), dec!(14)),
    PriceTier::new(51, None, dec!(12)),
];

/// Flat fee charged once on top of the quote when a deposit reserves a recurring slot.
pub const DEPOSIT_AMOUNT: Decimal = dec!(25);

/// Smallest monthly contract eligible for annual prepay.
pub const ANNUAL_MINIMUM_MONTHLY: Decimal = dec!(1000);

pub fn can_tiers(cadence: TrashCadence) -> &'static [PriceTier] {
    match cadence {
        TrashCadence::Biweekly => BIWEEKLY_CAN_TIERS,
        TrashCadence::Monthly => MONTHLY_CAN_TIERS,
        TrashCadence::None => &[],
    }
}

/// Unit price of the first tier containing `quantity`, or zero when nothing matches.
pub fn price_for_quantity(tiers: &[PriceTier], quantity: u32) -> Decimal {
    tiers
        .iter()
        .find(|tier| tier.contains(quantity))
        .map(|tier| tier.unit_price)
        .unwrap_or(Decimal::ZERO)
}

pub fn pad_monthly_price(size: PadSize, cadence: PadCadence) -> Decimal {
    match (size, cadence) {
        (PadSize::Small, PadCadence::Weekly) => dec!(150),
        (PadSize::Small, PadCadence::Biweekly) => dec!(100),
        (PadSize::Small, PadCadence::Monthly) => dec!(75),
        (PadSize::Medium, PadCadence::Weekly) => dec!(250),
        (PadSize::Medium, PadCadence::Biweekly) => dec!(175),
        (PadSize::Medium, PadCadence::Monthly) => dec!(125),
        (PadSize::Large, PadCadence::Weekly) => dec!(400),
        (PadSize::Large, PadCadence::Biweekly) => dec!(275),
        (PadSize::Large, PadCadence::Monthly) => dec!(200),
    }
}

pub fn deep_clean_per_can(level: DeepCleanLevel) -> Decimal {
    match level {
        DeepCleanLevel::Standard => dec!(35),
        DeepCleanLevel::Heavy => dec!(50),
        DeepCleanLevel::Extreme => dec!(75),
    }
}

/// Coerce a raw form value into a non-negative whole quantity.
///
/// Numbers and numeric strings are truncated toward zero; negative, non-finite,
/// non-numeric, and missing values all become 0.
pub fn coerce_quantity(value: &Value) -> u32 {
    let raw = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    match raw {
        Some(quantity) if quantity.is_finite() && quantity > 0.0 => {
            quantity.trunc().min(f64::from(u32::MAX)) as u32
        }
        _ => 0,
    }
}

pub(crate) fn lenient_quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_quantity(&value))
}

/// Location counts below one are treated as a single location.
pub(crate) fn lenient_locations<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_quantity(&value).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_partitions(tiers: &[PriceTier]) {
        assert_eq!(tiers.first().map(|tier| tier.min), Some(1));
        for pair in tiers.windows(2) {
            let upper = pair[0].max.expect("only the last tier is unbounded");
            assert_eq!(pair[1].min, upper + 1, "tiers must not gap or overlap");
        }
        assert_eq!(tiers.last().and_then(|tier| tier.max), None);
    }

    #[test]
    fn tier_tables_partition_quantity_domain() {
        assert_partitions(BIWEEKLY_CAN_TIERS);
        assert_partitions(MONTHLY_CAN_TIERS);
    }

    #[test]
    fn unit_price_never_increases_with_volume() {
        for tiers in [BIWEEKLY_CAN_TIERS, MONTHLY_CAN_TIERS] {
            let mut previous = price_for_quantity(tiers, 1);
            for quantity in 2..=250 {
                let current = price_for_quantity(tiers, quantity);
                assert!(
                    current <= previous,
                    "unit price rose from {previous} to {current} at {quantity} cans"
                );
                previous = current;
            }
        }
    }

    #[test]
    fn lookup_uses_inclusive_bounds() {
        assert_eq!(price_for_quantity(BIWEEKLY_CAN_TIERS, 10), dec!(25));
        assert_eq!(price_for_quantity(BIWEEKLY_CAN_TIERS, 11), dec!(23));
        assert_eq!(price_for_quantity(BIWEEKLY_CAN_TIERS, 15), dec!(23));
        assert_eq!(price_for_quantity(MONTHLY_CAN_TIERS, 50), dec!(14));
        assert_eq!(price_for_quantity(MONTHLY_CAN_TIERS, 5_000), dec!(12));
    }

    #[test]
    fn lookup_returns_zero_without_a_match() {
        assert_eq!(price_for_quantity(BIWEEKLY_CAN_TIERS, 0), Decimal::ZERO);
        assert_eq!(price_for_quantity(can_tiers(TrashCadence::None), 12), Decimal::ZERO);
    }

    #[test]
    fn coercion_treats_bad_input_as_zero() {
        assert_eq!(coerce_quantity(&json!(12)), 12);
        assert_eq!(coerce_quantity(&json!("7")), 7);
        assert_eq!(coerce_quantity(&json!(" 3.9 ")), 3);
        assert_eq!(coerce_quantity(&json!(-4)), 0);
        assert_eq!(coerce_quantity(&json!("many")), 0);
        assert_eq!(coerce_quantity(&json!(null)), 0);
        assert_eq!(coerce_quantity(&json!(true)), 0);
    }
}
