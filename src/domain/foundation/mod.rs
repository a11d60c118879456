//! Foundation module - Shared domain primitives.
//!
//! Identifiers, time, error types and the state machine trait used by the
//! promotion, subscription and ledger modules.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{
    CustomerId, EventId, LedgerEntryId, ListingId, PaymentIntentId, SubscriptionId, UserId,
};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
