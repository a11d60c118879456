//! Shared fixtures for integration tests.
//!
//! Wires the in-memory adapters and the mock processor exactly the way
//! `main.rs` wires the PostgreSQL and Stripe adapters, and signs webhook
//! payloads with the same scheme the processor uses.

#![allow(dead_code)]

use std::sync::Arc;

use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::{json, Value};
use sha2::Sha256;

use marketplace_billing::adapters::http::{app_router, BillingAppState};
use marketplace_billing::adapters::memory::{
    InMemoryBillingAccountRepository, InMemoryListingRepository, InMemoryPaymentLedger,
    InMemoryWebhookEventRepository,
};
use marketplace_billing::adapters::stripe::MockPaymentProcessor;
use marketplace_billing::application::{
    build_webhook_registry, GetBoostStatusHandler, HandleProcessorWebhookCommand,
    HandleProcessorWebhookHandler, HandleProcessorWebhookResult, RequestBoostCommand,
    RequestBoostHandler, RequestBoostResult, RequestPremiumHandler, SweepExpiredHandler,
    WebhookHandlerDeps,
};
use marketplace_billing::config::ServerConfig;
use marketplace_billing::domain::billing::BillingError;
use marketplace_billing::domain::foundation::{ListingId, Timestamp, UserId};
use marketplace_billing::domain::promotion::{BoostPlanCatalog, Listing};
use marketplace_billing::domain::subscription::{BillingAccount, PremiumTerms};
use marketplace_billing::domain::webhook::{
    IdempotentWebhookProcessor, WebhookError, WebhookVerifier,
};

pub const WEBHOOK_SECRET: &str = "whsec_integration_secret";
pub const PREMIUM_PRICE: &str = "price_premium_monthly";
pub const OWNER: &str = "owner-1";

/// Builds a `t=...,v1=...` signature header for `payload`.
pub fn sign(payload: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub fn owner() -> UserId {
    UserId::new(OWNER).unwrap()
}

/// A processor event envelope created now.
pub fn event(id: &str, event_type: &str, object: Value) -> String {
    json!({
        "id": id,
        "object": "event",
        "type": event_type,
        "created": Timestamp::now().as_unix_secs(),
        "livemode": false,
        "data": { "object": object }
    })
    .to_string()
}

/// A `payment_intent.*` event for a boost.
pub fn boost_intent_event(
    event_id: &str,
    event_type: &str,
    payment_intent_id: &str,
    listing_id: &ListingId,
    plan: &str,
    amount: i64,
) -> String {
    event(
        event_id,
        event_type,
        json!({
            "id": payment_intent_id,
            "object": "payment_intent",
            "amount": amount,
            "amount_received": amount,
            "currency": "mxn",
            "status": "succeeded",
            "metadata": {
                "listingId": listing_id.to_string(),
                "planId": plan,
                "userId": OWNER
            }
        }),
    )
}

/// A `charge.succeeded` event that only references its intent.
pub fn charge_event(event_id: &str, payment_intent_id: &str, amount: i64) -> String {
    event(
        event_id,
        "charge.succeeded",
        json!({
            "id": format!("ch_{}", event_id),
            "object": "charge",
            "amount": amount,
            "currency": "mxn",
            "payment_intent": payment_intent_id
        }),
    )
}

/// Everything a billing flow touches, backed by memory.
pub struct Harness {
    pub listings: Arc<InMemoryListingRepository>,
    pub accounts: Arc<InMemoryBillingAccountRepository>,
    pub ledger: Arc<InMemoryPaymentLedger>,
    pub events: Arc<InMemoryWebhookEventRepository>,
    pub processor: MockPaymentProcessor,
    pub catalog: Arc<BoostPlanCatalog>,
    pub terms: Arc<PremiumTerms>,
    pub webhook: Arc<HandleProcessorWebhookHandler>,
    pub listing_id: ListingId,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_catalog(BoostPlanCatalog::default()).await
    }

    /// Harness with one listing owned by [`OWNER`] and a billing account for them.
    pub async fn with_catalog(catalog: BoostPlanCatalog) -> Self {
        let listings = Arc::new(InMemoryListingRepository::new());
        let accounts = Arc::new(InMemoryBillingAccountRepository::new());
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let events = Arc::new(InMemoryWebhookEventRepository::new());
        let processor = MockPaymentProcessor::new();
        let catalog = Arc::new(catalog);
        let terms = Arc::new(PremiumTerms::new(PREMIUM_PRICE));

        let listing_id = ListingId::new();
        listings.insert(Listing::new(listing_id, owner())).await;
        accounts
            .insert(BillingAccount::new(owner()).with_email("owner@example.com"))
            .await;

        let deps = WebhookHandlerDeps {
            listings: listings.clone(),
            accounts: accounts.clone(),
            ledger: ledger.clone(),
            processor: Arc::new(processor.clone()),
            catalog: catalog.clone(),
            terms: terms.clone(),
        };
        let webhook = Arc::new(HandleProcessorWebhookHandler::new(
            WebhookVerifier::new(SecretString::new(WEBHOOK_SECRET.to_string())),
            Arc::new(IdempotentWebhookProcessor::new(
                events.clone(),
                build_webhook_registry(deps),
            )),
        ));

        Self {
            listings,
            accounts,
            ledger,
            events,
            processor,
            catalog,
            terms,
            webhook,
            listing_id,
        }
    }

    pub fn deps(&self) -> WebhookHandlerDeps {
        WebhookHandlerDeps {
            listings: self.listings.clone(),
            accounts: self.accounts.clone(),
            ledger: self.ledger.clone(),
            processor: Arc::new(self.processor.clone()),
            catalog: self.catalog.clone(),
            terms: self.terms.clone(),
        }
    }

    pub fn request_boost_handler(&self) -> RequestBoostHandler {
        RequestBoostHandler::new(
            self.listings.clone(),
            self.ledger.clone(),
            Arc::new(self.processor.clone()),
            self.catalog.clone(),
        )
    }

    pub fn boost_status_handler(&self) -> GetBoostStatusHandler {
        GetBoostStatusHandler::new(self.listings.clone(), self.ledger.clone())
    }

    pub fn request_premium_handler(&self) -> RequestPremiumHandler {
        RequestPremiumHandler::new(
            self.accounts.clone(),
            self.ledger.clone(),
            Arc::new(self.processor.clone()),
            self.terms.clone(),
        )
    }

    pub fn sweeper(&self) -> SweepExpiredHandler {
        SweepExpiredHandler::new(
            self.listings.clone(),
            self.accounts.clone(),
            self.events.clone(),
            &self.terms,
        )
    }

    pub async fn request_boost(&self, plan: &str) -> Result<RequestBoostResult, BillingError> {
        self.request_boost_handler()
            .handle(RequestBoostCommand {
                listing_id: self.listing_id,
                plan_id: plan.to_string(),
                user_id: owner(),
            })
            .await
    }

    /// Delivers a correctly signed payload.
    pub async fn deliver(
        &self,
        payload: &str,
    ) -> Result<HandleProcessorWebhookResult, WebhookError> {
        self.webhook
            .handle(HandleProcessorWebhookCommand {
                payload: payload.as_bytes().to_vec(),
                signature: Some(sign(payload, Timestamp::now().as_unix_secs())),
            })
            .await
    }

    pub fn router(&self) -> axum::Router {
        let state = BillingAppState::new(self.deps(), self.webhook.clone());
        app_router(state, &ServerConfig::default())
    }
}
