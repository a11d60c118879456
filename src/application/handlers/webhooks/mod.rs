//! Webhook reconciliation handlers.
//!
//! Each handler turns one kind of verified processor event into ledger,
//! promotion or premium updates and reports a [`WebhookOutcome`].
//!
//! [`WebhookOutcome`]: crate::domain::webhook::WebhookOutcome

mod boost_payment;
mod compensation;
mod handle_processor_webhook;
mod premium_invoice;
mod registry;
mod subscription_changed;

pub use boost_payment::{
    BoostPaymentCanceledHandler, BoostPaymentSucceededHandler, PaymentFailedHandler,
    LEGACY_META_LISTING_ID,
};
pub use compensation::{
    is_compensated, CompensationTarget, RefundCompensator, COMPENSATION_REASON,
    REFUND_FAILED_PREFIX,
};
pub use handle_processor_webhook::{
    HandleProcessorWebhookCommand, HandleProcessorWebhookHandler, HandleProcessorWebhookResult,
};
pub use premium_invoice::{InvoicePaidHandler, InvoicePaymentFailedHandler};
pub use registry::{build_webhook_registry, WebhookHandlerDeps};
pub use subscription_changed::SubscriptionChangedHandler;
