//! Stripe payment processor adapter.
//!
//! Implements the `PaymentProcessor` port for Stripe, including:
//! - Payment intents for listing boosts
//! - Customers, payment methods and subscriptions for premium
//! - Invoice history
//! - Refunds for compensation
//!
//! Webhook signature verification lives in `domain::webhook::WebhookVerifier`
//! because it needs no network access.
//!
//! # Security
//!
//! - The secret key is held in `secrecy::SecretString` and only exposed
//!   when building the basic-auth header

mod api_types;
mod mock_payment_processor;
mod stripe_adapter;

pub use mock_payment_processor::{MethodCall, MockPaymentProcessor};
pub use stripe_adapter::{StripeConfig, StripePaymentProcessor, DEFAULT_API_BASE_URL};
