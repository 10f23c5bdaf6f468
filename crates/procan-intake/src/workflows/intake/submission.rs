use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{
    BillingCadence, BillingType, DeepCleanLevel, DeepCleanScope, PadCadence, PadSize,
    PaymentMethod, TrashCadence,
};
use super::quote::Quote;

pub const SUBMISSION_SOURCE: &str = "procan-intake";

/// Opaque order identifier: 64 random bits rendered as 16 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    pub fn generate() -> Self {
        let bits: u64 = rand::thread_rng().gen();
        Self(format!("{bits:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Contact and business fields collected on the first intake step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFields {
    pub business_name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    #[serde(default)]
    pub preferred_service_day: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl ContactFields {
    /// Human-readable problems that block confirmation; empty when the fields are usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.business_name.trim().is_empty() {
            problems.push("Business / account name is required.".to_string());
        }
        if self.contact_name.trim().is_empty() {
            problems.push("Primary contact name is required.".to_string());
        }
        if !looks_like_email(&self.email) {
            problems.push("A valid email is required (for contract + receipt).".to_string());
        }
        if self.phone.chars().filter(char::is_ascii_digit).count() < 10 {
            problems.push("A valid phone number is required.".to_string());
        }
        if self.address.trim().is_empty() {
            problems.push("Service address is required.".to_string());
        }
        problems
    }
}

/// Everything that blocks confirming an order: contact problems plus service and schedule gaps.
pub fn confirmation_problems(quote: &Quote, contact: &ContactFields) -> Vec<String> {
    let mut problems = contact.problems();
    if !quote.has_service() {
        problems.push(
            "Select at least one service: Trash can cleaning (with # of cans) and/or Dumpster pad add-on."
                .to_string(),
        );
    }
    if quote.trash_cadence != TrashCadence::None && quote.can_count == 0 && quote.pad.is_none() {
        problems.push("Enter the total number of cans (must be greater than 0).".to_string());
    }
    if quote.start_date.is_none() {
        problems.push("Start date is required.".to_string());
    }
    problems
}

fn looks_like_email(raw: &str) -> bool {
    let value = raw.trim();
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
                    .unwrap_or(false)
        }
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionMeta {
    pub id: SubmissionId,
    pub created_at: DateTime<Utc>,
    pub source: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessDetails {
    pub name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub locations: u32,
    pub preferred_service_day: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrashSnapshot {
    pub cadence: TrashCadence,
    pub cans: u32,
    pub tier_price_per_can: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PadSnapshot {
    pub enabled: bool,
    pub size: Option<PadSize>,
    pub cadence: Option<PadCadence>,
    pub monthly_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeepCleanSnapshot {
    pub enabled: bool,
    pub level: Option<DeepCleanLevel>,
    pub applies: Option<DeepCleanScope>,
    pub qty: u32,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicesSnapshot {
    pub trash: TrashSnapshot,
    pub pad: PadSnapshot,
    pub deep_clean: DeepCleanSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingSnapshot {
    pub option: BillingCadence,
    pub months_in_term: u32,
    pub start_date: Option<NaiveDate>,
    pub one_time_only: bool,
    pub capture_only: bool,
    pub deposit: bool,
    pub payment_method: PaymentMethod,
    pub billing_type: BillingType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingSnapshot {
    pub discount_code: String,
    pub discount_code_rate: Decimal,
    pub base_monthly: Decimal,
    pub monthly_total: Decimal,
    pub per_visit_total: Decimal,
    pub discount_total: Decimal,
    pub location_discount_rate: Decimal,
    pub billing_discount_rate: Decimal,
    pub deep_clean_total: Decimal,
    pub due_today: Decimal,
    pub normal_due_today: Decimal,
    pub is_deposit: bool,
    pub deposit_amount: Decimal,
}

/// Frozen record of what the customer agreed to pay.
///
/// Fields are only reachable through shared references, so a submission handed to a
/// collaborator is exactly the one that was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    meta: SubmissionMeta,
    business: BusinessDetails,
    services: ServicesSnapshot,
    billing: BillingSnapshot,
    pricing: PricingSnapshot,
    notes: String,
}

impl Submission {
    pub fn id(&self) -> &SubmissionId {
        &self.meta.id
    }

    pub fn meta(&self) -> &SubmissionMeta {
        &self.meta
    }

    pub fn business(&self) -> &BusinessDetails {
        &self.business
    }

    pub fn services(&self) -> &ServicesSnapshot {
        &self.services
    }

    pub fn billing(&self) -> &BillingSnapshot {
        &self.billing
    }

    pub fn pricing(&self) -> &PricingSnapshot {
        &self.pricing
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }
}

/// Snapshot a quote and the contact fields into a new submission with a fresh id.
pub fn build_submission(quote: &Quote, contact: &ContactFields) -> Submission {
    build_submission_at(quote, contact, SubmissionId::generate(), Utc::now())
}

pub fn build_submission_at(
    quote: &Quote,
    contact: &ContactFields,
    id: SubmissionId,
    created_at: DateTime<Utc>,
) -> Submission {
    let preferred_service_day = contact
        .preferred_service_day
        .as_deref()
        .map(str::trim)
        .filter(|day| !day.is_empty())
        .unwrap_or("unspecified")
        .to_string();

    let pad = match &quote.pad {
        Some(line) => PadSnapshot {
            enabled: true,
            size: Some(line.size),
            cadence: Some(line.cadence),
            monthly_value: quote.pad_monthly,
        },
        None => PadSnapshot {
            enabled: false,
            size: None,
            cadence: None,
            monthly_value: Decimal::ZERO,
        },
    };

    let deep_clean = match &quote.deep_clean {
        Some(line) => DeepCleanSnapshot {
            enabled: true,
            level: Some(line.level),
            applies: Some(line.applies_to),
            qty: line.requested_quantity,
            total: quote.deep_clean_total,
        },
        None => DeepCleanSnapshot {
            enabled: false,
            level: None,
            applies: None,
            qty: 0,
            total: Decimal::ZERO,
        },
    };

    Submission {
        meta: SubmissionMeta {
            id,
            created_at,
            source: SUBMISSION_SOURCE,
        },
        business: BusinessDetails {
            name: contact.business_name.trim().to_string(),
            contact_name: contact.contact_name.trim().to_string(),
            phone: contact.phone.trim().to_string(),
            email: contact.email.trim().to_string(),
            address: contact.address.trim().to_string(),
            locations: quote.locations,
            preferred_service_day,
        },
        services: ServicesSnapshot {
            trash: TrashSnapshot {
                cadence: quote.trash_cadence,
                cans: quote.can_count,
                tier_price_per_can: quote.trash_per_can,
            },
            pad,
            deep_clean,
        },
        billing: BillingSnapshot {
            option: quote.billing_cadence,
            months_in_term: quote.term_months,
            start_date: quote.start_date,
            one_time_only: quote.one_time_only,
            capture_only: quote.capture_only,
            deposit: quote.is_deposit,
            payment_method: contact.payment_method,
            billing_type: quote.billing_type,
        },
        pricing: PricingSnapshot {
            discount_code: quote.discount_code.clone().unwrap_or_default(),
            discount_code_rate: quote.promo_rate,
            base_monthly: quote.base_monthly,
            monthly_total: quote.monthly_total,
            per_visit_total: quote.per_visit_total,
            discount_total: quote.discount_total,
            location_discount_rate: quote.location_discount_rate,
            billing_discount_rate: quote.billing_discount_rate,
            deep_clean_total: quote.deep_clean_total,
            due_today: quote.due_today,
            normal_due_today: quote.normal_due_today,
            is_deposit: quote.is_deposit,
            deposit_amount: quote.deposit_amount,
        },
        notes: contact.notes.trim().to_string(),
    }
}
