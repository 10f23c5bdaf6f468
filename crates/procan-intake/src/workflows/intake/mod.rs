//! Intake flow: price menu, discount stack, quote engine, submission snapshot, and the
//! dispatcher that hands a confirmed order to checkout or cash-order persistence.

pub mod checkout;
pub mod discounts;
pub mod domain;
pub mod pricing;
pub mod quote;
pub mod router;
pub mod submission;

#[cfg(test)]
mod tests;

pub use checkout::{
    round_cents, to_minor_units, CheckoutDispatcher, DispatchError, DispatchOutcome,
    DispatchRoute, DispatchSettings,
};
pub use discounts::{apply_discounts, AppliedPromo, DiscountBreakdown, DiscountError};
pub use domain::{
    BillingCadence, BillingSelection, BillingType, DeepCleanLevel, DeepCleanScope,
    DeepCleanService, PadCadence, PadService, PadSize, PaymentMethod, TrashCadence, TrashService,
};
pub use pricing::{price_for_quantity, PriceTier};
pub use quote::{compute_quote, Quote, QuoteError, QuoteInputs};
pub use router::{intake_router, QuoteRequest, SubmissionRequest};
pub use submission::{build_submission, ContactFields, Submission, SubmissionId};
