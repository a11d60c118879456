//! Webhook module - verification, typed envelope and idempotent dispatch of
//! processor callbacks.

mod errors;
mod event;
mod objects;
mod outcome;
mod processor;
mod verifier;

pub use errors::WebhookError;
#[cfg(test)]
pub use event::ProcessorEventBuilder;
pub use event::{EventData, ProcessorEvent, ProcessorEventType};
pub use objects::{
    ChargeObject, InvoiceObject, PaymentIntentObject, SubscriptionObject,
};
pub use outcome::{OutcomeKind, WebhookOutcome};
pub use processor::{
    IdempotentWebhookProcessor, ProcessResult, WebhookEventHandler, WebhookRegistry,
};
#[cfg(test)]
pub use verifier::sign_test_payload;
pub use verifier::{SignatureHeader, WebhookVerifier};
