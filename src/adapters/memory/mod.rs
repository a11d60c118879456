//! In-memory repository adapters.
//!
//! Used by the unit and integration tests. Each store keeps its rows behind
//! a `tokio::sync::RwLock`, and conditional writes check and mutate under
//! one write guard, which gives the same atomicity the PostgreSQL adapters
//! get from single statements.

mod billing_account_repository;
mod listing_repository;
mod payment_ledger;
mod webhook_event_repository;

pub use billing_account_repository::InMemoryBillingAccountRepository;
pub use listing_repository::InMemoryListingRepository;
pub use payment_ledger::InMemoryPaymentLedger;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
