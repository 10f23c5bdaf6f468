//! Asynchronous payment confirmations: signature checks, event decoding, and the
//! ledger and email side effects of a completed checkout.

pub mod events;
pub mod handler;
pub mod router;
pub mod signature;

use crate::workflows::collaborators::StoreError;

pub use events::{parse_event, CompletedSession, EventEnvelope, PaymentEvent};
pub use handler::{ConfirmationHandler, ConfirmationOutcome, ConfirmationSettings};
pub use router::payments_router;
pub use signature::{sign_payload, verify_signature, SIGNATURE_TOLERANCE_SECS};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("missing Stripe-Signature header")]
    MissingSignature,
    #[error("malformed signature header: {0}")]
    MalformedSignature(String),
    #[error("signature timestamp is {age_secs}s from now")]
    StaleTimestamp { age_secs: u64 },
    #[error("signature does not match payload")]
    SignatureMismatch,
    #[error("webhook secret is not configured")]
    NotConfigured,
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WebhookError {
    /// Failures the sender caused; answered with 400 and never retried usefully.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature
                | WebhookError::MalformedSignature(_)
                | WebhookError::StaleTimestamp { .. }
                | WebhookError::SignatureMismatch
                | WebhookError::InvalidPayload(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            WebhookError::Store(error) => error.is_retryable(),
            _ => false,
        }
    }
}
