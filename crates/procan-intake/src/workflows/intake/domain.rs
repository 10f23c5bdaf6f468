use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::pricing::lenient_quantity;

/// Trash can service frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrashCadence {
    #[default]
    Biweekly,
    Monthly,
    None,
}

impl TrashCadence {
    pub const fn label(self) -> &'static str {
        match self {
            TrashCadence::Biweekly => "biweekly",
            TrashCadence::Monthly => "monthly",
            TrashCadence::None => "none",
        }
    }

    pub const fn visits_per_month(self) -> u32 {
        match self {
            TrashCadence::Biweekly => 2,
            TrashCadence::Monthly => 1,
            TrashCadence::None => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadSize {
    #[default]
    Small,
    Medium,
    Large,
}

impl PadSize {
    pub const fn label(self) -> &'static str {
        match self {
            PadSize::Small => "small",
            PadSize::Medium => "medium",
            PadSize::Large => "large",
        }
    }
}

/// Dumpster pad cleaning frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadCadence {
    #[default]
    Weekly,
    Biweekly,
    Monthly,
}

impl PadCadence {
    pub const fn label(self) -> &'static str {
        match self {
            PadCadence::Weekly => "weekly",
            PadCadence::Biweekly => "biweekly",
            PadCadence::Monthly => "monthly",
        }
    }

    pub const fn visits_per_month(self) -> u32 {
        match self {
            PadCadence::Weekly => 4,
            PadCadence::Biweekly => 2,
            PadCadence::Monthly => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeepCleanLevel {
    #[default]
    Standard,
    Heavy,
    Extreme,
}

impl DeepCleanLevel {
    pub const fn label(self) -> &'static str {
        match self {
            DeepCleanLevel::Standard => "standard",
            DeepCleanLevel::Heavy => "heavy",
            DeepCleanLevel::Extreme => "extreme",
        }
    }
}

/// Which cans a deep clean covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeepCleanScope {
    #[default]
    #[serde(alias = "allCans")]
    AllCans,
    #[serde(alias = "someCans")]
    SomeCans,
}

impl DeepCleanScope {
    pub const fn label(self) -> &'static str {
        match self {
            DeepCleanScope::AllCans => "all_cans",
            DeepCleanScope::SomeCans => "some_cans",
        }
    }
}

/// Invoicing interval for recurring plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCadence {
    #[default]
    Monthly,
    Quarterly,
    Annual,
}

impl BillingCadence {
    pub const fn label(self) -> &'static str {
        match self {
            BillingCadence::Monthly => "monthly",
            BillingCadence::Quarterly => "quarterly",
            BillingCadence::Annual => "annual",
        }
    }

    /// Calendar months covered by one billing cycle.
    pub const fn term_months(self) -> u32 {
        match self {
            BillingCadence::Monthly => 1,
            BillingCadence::Quarterly => 3,
            BillingCadence::Annual => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Card,
    Cash,
}

impl PaymentMethod {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Cash => "cash",
        }
    }
}

/// Billing mode tag carried on every submission and checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingType {
    OneTime,
    Subscription,
    Deposit,
    Setup,
}

impl BillingType {
    pub const fn label(self) -> &'static str {
        match self {
            BillingType::OneTime => "one_time",
            BillingType::Subscription => "subscription",
            BillingType::Deposit => "deposit",
            BillingType::Setup => "setup",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim() {
            "one_time" => Some(BillingType::OneTime),
            "subscription" => Some(BillingType::Subscription),
            "deposit" => Some(BillingType::Deposit),
            "setup" => Some(BillingType::Setup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrashService {
    #[serde(default)]
    pub cadence: TrashCadence,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub can_count: u32,
}

impl TrashService {
    /// Cans that actually receive recurring service.
    pub fn active_cans(&self) -> u32 {
        if self.cadence == TrashCadence::None {
            0
        } else {
            self.can_count
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PadService {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub size: PadSize,
    #[serde(default)]
    pub cadence: PadCadence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeepCleanService {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub level: DeepCleanLevel,
    #[serde(default)]
    pub applies_to: DeepCleanScope,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub quantity: u32,
}

impl DeepCleanService {
    /// Cans covered by the deep clean given the recurring can count.
    pub fn covered_cans(&self, can_count: u32) -> u32 {
        if !self.enabled {
            return 0;
        }
        match self.applies_to {
            DeepCleanScope::AllCans => can_count,
            DeepCleanScope::SomeCans => self.quantity,
        }
    }
}

/// Billing choices made on the schedule step.
///
/// A deposit reservation only holds a recurring slot, so it can never coexist with a
/// one-time order. The setters keep the two flags mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BillingSelection {
    cadence: BillingCadence,
    one_time_only: bool,
    deposit_reservation: bool,
    start_date: Option<NaiveDate>,
}

impl BillingSelection {
    /// Build a selection from raw flags; a one-time order wins over a deposit request.
    pub fn new(
        cadence: BillingCadence,
        one_time_only: bool,
        deposit_reservation: bool,
        start_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            cadence,
            one_time_only,
            deposit_reservation: deposit_reservation && !one_time_only,
            start_date,
        }
    }

    pub fn cadence(&self) -> BillingCadence {
        self.cadence
    }

    pub fn one_time_only(&self) -> bool {
        self.one_time_only
    }

    pub fn deposit_reservation(&self) -> bool {
        self.deposit_reservation
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn set_cadence(&mut self, cadence: BillingCadence) {
        self.cadence = cadence;
    }

    pub fn set_start_date(&mut self, start_date: Option<NaiveDate>) {
        self.start_date = start_date;
    }

    pub fn set_one_time_only(&mut self, enabled: bool) {
        self.one_time_only = enabled;
        if enabled {
            self.deposit_reservation = false;
        }
    }

    pub fn set_deposit_reservation(&mut self, enabled: bool) {
        self.deposit_reservation = enabled;
        if enabled {
            self.one_time_only = false;
        }
    }

    pub fn is_recurring(&self) -> bool {
        !self.one_time_only
    }

    /// Card is saved but not charged: recurring, no deposit, and service starts after `today`.
    pub fn capture_only(&self, today: NaiveDate) -> bool {
        self.is_recurring()
            && !self.deposit_reservation
            && self.start_date.map(|start| start > today).unwrap_or(false)
    }
}
