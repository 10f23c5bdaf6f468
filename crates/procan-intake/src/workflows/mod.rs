pub mod collaborators;
pub mod fulfillment;
pub mod gateways;
pub mod intake;
pub mod payments;
