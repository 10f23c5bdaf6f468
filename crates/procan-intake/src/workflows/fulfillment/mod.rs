//! Staff operations behind a static bearer token: order cancellation and route scheduling.

pub mod auth;
pub mod cancel;
pub mod router;
pub mod schedule;

use std::sync::Arc;

use crate::workflows::collaborators::{GatewayError, OrderLedger, StoreError, SubscriptionBilling};

pub use auth::bearer_matches;
pub use cancel::{CancelMode, CancelReceipt, CancelRequest};
pub use router::fulfillment_router;
pub use schedule::{OrderFailure, ScheduleReport, ScheduleRequest, DEFAULT_DEPOSIT};

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Order not found")]
    OrderNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl FulfillmentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FulfillmentError::Store(error) => error.is_retryable(),
            FulfillmentError::Gateway(error) => error.is_retryable(),
            FulfillmentError::Unauthorized
            | FulfillmentError::InvalidRequest(_)
            | FulfillmentError::OrderNotFound => false,
        }
    }
}

/// Order ledger plus subscription billing, guarded by the staff token.
pub struct FulfillmentService {
    ledger: Arc<dyn OrderLedger>,
    billing: Arc<dyn SubscriptionBilling>,
    staff_token: Option<String>,
}

impl FulfillmentService {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        billing: Arc<dyn SubscriptionBilling>,
        staff_token: Option<String>,
    ) -> Self {
        Self {
            ledger,
            billing,
            staff_token,
        }
    }

    pub fn staff_token(&self) -> Option<&str> {
        self.staff_token.as_deref()
    }
}
