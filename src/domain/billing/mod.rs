//! Billing module - errors shared by boost and premium operations.

mod errors;

pub use errors::BillingError;
