//! Wiring of the webhook handlers into a registry.

use std::sync::Arc;

use super::{
    BoostPaymentCanceledHandler, BoostPaymentSucceededHandler, InvoicePaidHandler,
    InvoicePaymentFailedHandler, PaymentFailedHandler, RefundCompensator,
    SubscriptionChangedHandler,
};
use crate::domain::promotion::BoostPlanCatalog;
use crate::domain::subscription::PremiumTerms;
use crate::domain::webhook::WebhookRegistry;
use crate::ports::{BillingAccountRepository, ListingRepository, PaymentLedger, PaymentProcessor};

/// Everything the webhook handlers read or write.
#[derive(Clone)]
pub struct WebhookHandlerDeps {
    pub listings: Arc<dyn ListingRepository>,
    pub accounts: Arc<dyn BillingAccountRepository>,
    pub ledger: Arc<dyn PaymentLedger>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub catalog: Arc<BoostPlanCatalog>,
    pub terms: Arc<PremiumTerms>,
}

/// Registers a handler for every processor event the marketplace reacts to.
pub fn build_webhook_registry(deps: WebhookHandlerDeps) -> WebhookRegistry {
    let compensator = Arc::new(RefundCompensator::new(
        deps.processor.clone(),
        deps.ledger.clone(),
    ));

    WebhookRegistry::new()
        .register(Arc::new(BoostPaymentSucceededHandler::new(
            deps.listings.clone(),
            deps.ledger.clone(),
            deps.catalog.clone(),
            compensator.clone(),
        )))
        .register(Arc::new(BoostPaymentCanceledHandler::new(
            deps.listings.clone(),
            deps.ledger.clone(),
            deps.catalog.clone(),
        )))
        .register(Arc::new(PaymentFailedHandler::new(
            deps.ledger.clone(),
            deps.catalog,
        )))
        .register(Arc::new(InvoicePaidHandler::new(
            deps.accounts.clone(),
            deps.ledger.clone(),
            deps.processor,
            deps.terms.clone(),
            compensator,
        )))
        .register(Arc::new(InvoicePaymentFailedHandler::new(
            deps.accounts.clone(),
            deps.ledger,
        )))
        .register(Arc::new(SubscriptionChangedHandler::new(
            deps.accounts,
            deps.terms,
        )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryBillingAccountRepository, InMemoryListingRepository, InMemoryPaymentLedger,
    };
    use crate::adapters::stripe::MockPaymentProcessor;
    use crate::domain::webhook::ProcessorEventType;

    #[test]
    fn every_reconciled_event_type_has_a_handler() {
        let registry = build_webhook_registry(WebhookHandlerDeps {
            listings: Arc::new(InMemoryListingRepository::new()),
            accounts: Arc::new(InMemoryBillingAccountRepository::new()),
            ledger: Arc::new(InMemoryPaymentLedger::new()),
            processor: Arc::new(MockPaymentProcessor::new()),
            catalog: Arc::new(BoostPlanCatalog::default()),
            terms: Arc::new(PremiumTerms::new("price_premium")),
        });

        for event_type in [
            ProcessorEventType::PaymentIntentSucceeded,
            ProcessorEventType::ChargeSucceeded,
            ProcessorEventType::PaymentIntentCanceled,
            ProcessorEventType::PaymentIntentPaymentFailed,
            ProcessorEventType::InvoicePaid,
            ProcessorEventType::InvoicePaymentSucceeded,
            ProcessorEventType::InvoicePaymentFailed,
            ProcessorEventType::SubscriptionUpdated,
            ProcessorEventType::SubscriptionDeleted,
        ] {
            assert!(
                registry.get_handler(&event_type).is_some(),
                "no handler for {}",
                event_type
            );
        }
        assert_eq!(registry.registered_types().len(), 9);
    }
}
