//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `ListingRepository` - Promotion fields of listings
//! - `BillingAccountRepository` - Premium fields and processor customer of users
//! - `PaymentLedger` - One entry per payment intent, create-if-absent
//! - `WebhookEventRepository` - Processed webhook event tracking
//!
//! ## External Services
//!
//! - `PaymentProcessor` - Intents, customers, subscriptions, invoices and refunds
//!
//! Conditional writes live behind these traits so concurrency is settled by
//! the store, not by in-process locks.

mod billing_account_repository;
mod listing_repository;
mod payment_ledger;
mod payment_processor;
mod webhook_event_repository;

pub use billing_account_repository::BillingAccountRepository;
pub use listing_repository::{ListingRepository, PromotionWrite};
pub use payment_ledger::{LedgerInsert, PaymentLedger};
pub use payment_processor::{
    CreateCustomerRequest, CreatePaymentIntentRequest, CreateRefundRequest,
    CreateSubscriptionRequest, Customer, Invoice, LatestInvoice, PaymentError, PaymentErrorCode,
    PaymentIntent, PaymentIntentStatus, PaymentMethod, PaymentProcessor, Refund, Subscription,
};
pub use webhook_event_repository::{SaveResult, WebhookEventRecord, WebhookEventRepository};
