//! Integration tests for the premium subscription flow.
//!
//! A premium request creates the processor customer and subscription, the
//! paid invoice grants premium, and subscription events or cancellation
//! revoke it.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{event, owner, Harness, PREMIUM_PRICE};
use marketplace_billing::application::{
    CancelPremiumCommand, CancelPremiumHandler, GetPremiumStatusHandler, GetPremiumStatusQuery,
    RequestPremiumCommand, RequestPremiumResult,
};
use marketplace_billing::domain::billing::BillingError;
use marketplace_billing::domain::foundation::{CustomerId, SubscriptionId, Timestamp};
use marketplace_billing::domain::ledger::{LedgerStatus, PaymentKind};
use marketplace_billing::domain::subscription::{PremiumStatus, SubscriptionState};
use marketplace_billing::domain::webhook::OutcomeKind;
use marketplace_billing::ports::PaymentMethod;

fn card() -> PaymentMethod {
    PaymentMethod {
        id: "pm_card_visa".to_string(),
        brand: Some("visa".to_string()),
        last4: Some("4242".to_string()),
    }
}

async fn request_premium(h: &Harness) -> Result<RequestPremiumResult, BillingError> {
    h.request_premium_handler()
        .handle(RequestPremiumCommand { user_id: owner() })
        .await
}

async fn customer_id(h: &Harness) -> CustomerId {
    h.accounts
        .get(&owner())
        .await
        .unwrap()
        .customer_id
        .expect("customer assigned")
}

/// Requests premium with a card on file and confirms the first invoice at the processor.
async fn subscribe(h: &Harness) -> SubscriptionId {
    // First call creates the customer and fails for lack of a card
    let _ = request_premium(h).await;
    h.processor
        .attach_payment_method(&customer_id(h).await, card(), false);

    let subscription_id = match request_premium(h).await.unwrap() {
        RequestPremiumResult::Created {
            subscription_id, ..
        } => subscription_id,
        other => panic!("expected a new subscription, got {:?}", other),
    };
    h.processor
        .set_subscription_status(&subscription_id, SubscriptionState::Active);
    subscription_id
}

async fn invoice_paid(h: &Harness, event_id: &str, subscription_id: &SubscriptionId) -> String {
    let subscription = h
        .processor
        .subscriptions()
        .into_iter()
        .find(|s| &s.id == subscription_id)
        .unwrap();
    let invoice = subscription.latest_invoice.unwrap();
    let period_end = subscription.current_period_end.unwrap();

    event(
        event_id,
        "invoice.paid",
        json!({
            "id": invoice.id,
            "object": "invoice",
            "customer": customer_id(h).await.to_string(),
            "subscription": subscription_id.to_string(),
            "payment_intent": invoice.payment_intent_id.unwrap().to_string(),
            "amount_paid": 9900,
            "amount_due": 9900,
            "currency": "mxn",
            "lines": { "data": [ { "period": {
                "start": Timestamp::now().as_unix_secs(),
                "end": period_end
            } } ] }
        }),
    )
}

fn subscription_deleted(event_id: &str, subscription_id: &SubscriptionId, customer: &CustomerId) -> String {
    event(
        event_id,
        "customer.subscription.deleted",
        json!({
            "id": subscription_id.to_string(),
            "object": "subscription",
            "customer": customer.to_string(),
            "status": "canceled",
            "cancel_at_period_end": false,
            "items": { "data": [ { "price": { "id": PREMIUM_PRICE } } ] }
        }),
    )
}

#[tokio::test]
async fn premium_without_payment_method_is_rejected() {
    let h = Harness::new().await;

    let err = request_premium(&h).await.unwrap_err();

    assert!(matches!(err, BillingError::PaymentMethodRequired));
    assert!(!h.processor.was_called("create_subscription"));
    // The customer exists now and is reused by the next request
    let first = customer_id(&h).await;
    let _ = request_premium(&h).await;
    assert_eq!(customer_id(&h).await, first);
    assert_eq!(h.processor.call_count("create_customer"), 1);
}

#[tokio::test]
async fn paid_invoice_grants_premium_until_period_end() {
    let h = Harness::new().await;
    let subscription_id = subscribe(&h).await;
    assert!(!h.accounts.get(&owner()).await.unwrap().premium.is_premium);

    let result = h
        .deliver(&invoice_paid(&h, "evt_invoice_1", &subscription_id).await)
        .await
        .unwrap();

    assert_eq!(result.outcome.kind(), OutcomeKind::Applied);
    let account = h.accounts.get(&owner()).await.unwrap();
    let period_end = h.processor.subscriptions()[0].current_period_end.unwrap();
    assert_eq!(
        account.premium,
        PremiumStatus::until(Timestamp::from_unix_secs(period_end).unwrap())
    );

    let entries = h.ledger.all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, PaymentKind::PremiumSubscription);
    assert_eq!(entries[0].status, LedgerStatus::Succeeded);
}

#[tokio::test]
async fn second_request_returns_existing_subscription() {
    let h = Harness::new().await;
    let subscription_id = subscribe(&h).await;

    let again = request_premium(&h).await.unwrap();

    match again {
        RequestPremiumResult::AlreadyPremium {
            subscription_id: existing,
            status,
            ..
        } => {
            assert_eq!(existing, subscription_id);
            assert_eq!(status, SubscriptionState::Active);
        }
        other => panic!("expected AlreadyPremium, got {:?}", other),
    }
    assert_eq!(h.processor.call_count("create_subscription"), 1);
}

#[tokio::test]
async fn deleted_subscription_revokes_premium() {
    let h = Harness::new().await;
    let subscription_id = subscribe(&h).await;
    h.deliver(&invoice_paid(&h, "evt_invoice_1", &subscription_id).await)
        .await
        .unwrap();

    let customer = customer_id(&h).await;
    h.deliver(&subscription_deleted("evt_deleted", &subscription_id, &customer))
        .await
        .unwrap();

    assert_eq!(
        h.accounts.get(&owner()).await.unwrap().premium,
        PremiumStatus::free()
    );
}

#[tokio::test]
async fn status_reflects_paid_subscription() {
    let h = Harness::new().await;
    let subscription_id = subscribe(&h).await;
    h.deliver(&invoice_paid(&h, "evt_invoice_1", &subscription_id).await)
        .await
        .unwrap();

    let status = GetPremiumStatusHandler::new(
        h.accounts.clone(),
        Arc::new(h.processor.clone()),
        h.terms.clone(),
    )
    .handle(GetPremiumStatusQuery { user_id: owner() })
    .await
    .unwrap();

    assert!(status.is_premium);
    assert_eq!(status.customer_id, Some(customer_id(&h).await));
    assert_eq!(status.subscription.unwrap().id, subscription_id);
}

#[tokio::test]
async fn immediate_cancellation_revokes_premium() {
    let h = Harness::new().await;
    let subscription_id = subscribe(&h).await;
    h.deliver(&invoice_paid(&h, "evt_invoice_1", &subscription_id).await)
        .await
        .unwrap();
    let handler = CancelPremiumHandler::new(
        h.accounts.clone(),
        Arc::new(h.processor.clone()),
        h.terms.clone(),
    );

    let result = handler
        .handle(CancelPremiumCommand {
            user_id: owner(),
            at_period_end: false,
        })
        .await
        .unwrap();

    assert_eq!(result.subscription_id, subscription_id);
    assert_eq!(result.status, SubscriptionState::Canceled);
    assert!(!h.accounts.get(&owner()).await.unwrap().premium.is_premium);
}

#[tokio::test]
async fn cancellation_at_period_end_keeps_premium() {
    let h = Harness::new().await;
    let subscription_id = subscribe(&h).await;
    h.deliver(&invoice_paid(&h, "evt_invoice_1", &subscription_id).await)
        .await
        .unwrap();
    let before = h.accounts.get(&owner()).await.unwrap().premium;

    let result = CancelPremiumHandler::new(
        h.accounts.clone(),
        Arc::new(h.processor.clone()),
        h.terms.clone(),
    )
    .handle(CancelPremiumCommand {
        user_id: owner(),
        at_period_end: true,
    })
    .await
    .unwrap();

    assert!(result.cancel_at_period_end);
    assert_eq!(h.accounts.get(&owner()).await.unwrap().premium, before);
}
