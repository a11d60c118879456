//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresListingRepository` - Promotion columns of listings
//! - `PostgresBillingAccountRepository` - Customer id and premium fields of users
//! - `PostgresPaymentLedger` - Payment attempts, unique per payment intent
//! - `PostgresWebhookEventRepository` - Processed webhook events
//!
//! Every write is a single conditional statement; none of the adapters
//! read-modify-write.

mod billing_account_repository;
mod listing_repository;
mod payment_ledger;
mod webhook_event_repository;

pub use billing_account_repository::PostgresBillingAccountRepository;
pub use listing_repository::PostgresListingRepository;
pub use payment_ledger::PostgresPaymentLedger;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Wraps a driver error with the operation that failed.
fn database_error(operation: &str, err: sqlx::Error) -> DomainError {
    tracing::error!(operation = operation, error = %err, "Database operation failed");
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Failed to {}: {}", operation, err),
    )
}
