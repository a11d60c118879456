//! Integration tests for the listing boost flow.
//!
//! Each test drives the public handlers end to end: a boost request creates
//! the intent and the pending ledger entry, a signed webhook delivery
//! reconciles it, and the sweeper expires it.

mod common;

use chrono::Duration;

use common::{boost_intent_event, charge_event, owner, Harness};
use marketplace_billing::application::{GetBoostStatusQuery, RequestBoostCommand};
use marketplace_billing::domain::billing::BillingError;
use marketplace_billing::domain::foundation::{ListingId, PaymentIntentId, Timestamp};
use marketplace_billing::domain::ledger::{LedgerStatus, PaymentKind};
use marketplace_billing::domain::promotion::{BoostPlan, BoostPlanCatalog, BoostPlanId, Promotion};
use marketplace_billing::domain::webhook::OutcomeKind;
use marketplace_billing::ports::PaymentLedger;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

async fn ledger_status(h: &Harness, pi: &PaymentIntentId) -> Option<LedgerStatus> {
    h.ledger
        .find_by_payment_intent(pi)
        .await
        .unwrap()
        .map(|entry| entry.status)
}

// =============================================================================
// Request and settle
// =============================================================================

#[tokio::test]
async fn paid_boost_promotes_listing_and_settles_ledger() {
    let h = Harness::new().await;

    let boost = h.request_boost("24h").await.unwrap();
    assert_eq!(boost.amount, 150);
    assert_eq!(boost.currency, "mxn");
    assert!(!boost.reused);
    assert_eq!(
        ledger_status(&h, &boost.payment_intent_id).await,
        Some(LedgerStatus::Pending)
    );

    let payload = boost_intent_event(
        "evt_boost_1",
        "payment_intent.succeeded",
        boost.payment_intent_id.as_str(),
        &h.listing_id,
        "24h",
        150,
    );
    let result = h.deliver(&payload).await.unwrap();

    assert_eq!(result.outcome.kind(), OutcomeKind::Applied);
    assert!(!result.duplicate);

    let listing = h.listings.get(&h.listing_id).await.unwrap();
    assert!(listing.promotion.is_active_at(Timestamp::now()));
    assert_eq!(listing.promotion.plan, Some(BoostPlanId::Day));

    let entries = h.ledger.all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, LedgerStatus::Succeeded);
    assert_eq!(entries[0].kind, PaymentKind::ListingBoost);
    let completed_at = entries[0].completed_at.unwrap();
    assert_eq!(
        listing.promotion.promoted_until,
        Some(completed_at.plus_millis(DAY_MS))
    );
}

#[tokio::test]
async fn redelivered_event_is_a_duplicate_and_does_not_extend_promotion() {
    let h = Harness::new().await;
    let boost = h.request_boost("72h").await.unwrap();
    let payload = boost_intent_event(
        "evt_boost_1",
        "payment_intent.succeeded",
        boost.payment_intent_id.as_str(),
        &h.listing_id,
        "72h",
        350,
    );

    h.deliver(&payload).await.unwrap();
    let first = h.listings.get(&h.listing_id).await.unwrap().promotion;
    let again = h.deliver(&payload).await.unwrap();

    assert!(again.duplicate);
    assert_eq!(h.listings.get(&h.listing_id).await.unwrap().promotion, first);
    assert_eq!(h.events.len().await, 1);
    assert_eq!(h.ledger.len().await, 1);
}

#[tokio::test]
async fn concurrent_redeliveries_apply_once() {
    let h = Harness::new().await;
    let boost = h.request_boost("24h").await.unwrap();
    let payload = boost_intent_event(
        "evt_boost_1",
        "payment_intent.succeeded",
        boost.payment_intent_id.as_str(),
        &h.listing_id,
        "24h",
        150,
    );

    let (a, b) = tokio::join!(h.deliver(&payload), h.deliver(&payload));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!([a.duplicate, b.duplicate].iter().filter(|d| **d).count(), 1);
    assert_eq!(h.events.len().await, 1);
    assert_eq!(h.ledger.len().await, 1);
}

#[tokio::test]
async fn charge_event_after_intent_event_leaves_promotion_unchanged() {
    let h = Harness::new().await;
    let boost = h.request_boost("1week").await.unwrap();
    let pi = boost.payment_intent_id.as_str();

    h.deliver(&boost_intent_event(
        "evt_intent",
        "payment_intent.succeeded",
        pi,
        &h.listing_id,
        "1week",
        600,
    ))
    .await
    .unwrap();
    let after_intent = h.listings.get(&h.listing_id).await.unwrap().promotion;

    let result = h.deliver(&charge_event("evt_charge", pi, 600)).await.unwrap();

    assert!(!result.duplicate);
    assert_eq!(
        h.listings.get(&h.listing_id).await.unwrap().promotion,
        after_intent
    );
    assert_eq!(h.ledger.len().await, 1);
}

#[tokio::test]
async fn canceled_intent_settles_ledger_without_promotion() {
    let h = Harness::new().await;
    let boost = h.request_boost("24h").await.unwrap();

    h.deliver(&boost_intent_event(
        "evt_cancel",
        "payment_intent.canceled",
        boost.payment_intent_id.as_str(),
        &h.listing_id,
        "24h",
        150,
    ))
    .await
    .unwrap();

    assert_eq!(
        ledger_status(&h, &boost.payment_intent_id).await,
        Some(LedgerStatus::Canceled)
    );
    assert!(!h.listings.get(&h.listing_id).await.unwrap().promotion.is_promoted);
}

// =============================================================================
// Requests
// =============================================================================

#[tokio::test]
async fn repeated_request_reuses_pending_intent() {
    let h = Harness::new().await;

    let first = h.request_boost("24h").await.unwrap();
    let second = h.request_boost("24h").await.unwrap();

    assert_eq!(first.payment_intent_id, second.payment_intent_id);
    assert!(second.reused);
    assert_eq!(h.processor.intent_count(), 1);
    assert_eq!(h.ledger.len().await, 1);
}

#[tokio::test]
async fn concurrent_requests_share_one_intent() {
    let h = Harness::new().await;

    let (a, b) = tokio::join!(h.request_boost("72h"), h.request_boost("72h"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.payment_intent_id, b.payment_intent_id);
    assert_eq!(h.processor.intent_count(), 1);
    assert_eq!(h.ledger.len().await, 1);
}

#[tokio::test]
async fn running_promotion_rejects_new_boost() {
    let h = Harness::new().await;
    let boost = h.request_boost("24h").await.unwrap();
    h.deliver(&boost_intent_event(
        "evt_boost_1",
        "payment_intent.succeeded",
        boost.payment_intent_id.as_str(),
        &h.listing_id,
        "24h",
        150,
    ))
    .await
    .unwrap();

    let err = h.request_boost("72h").await.unwrap_err();

    match err {
        BillingError::AlreadyPromoted { remaining, .. } => assert!(remaining.hours >= 23),
        other => panic!("expected AlreadyPromoted, got {:?}", other),
    }
    assert_eq!(h.processor.intent_count(), 1);
}

#[tokio::test]
async fn configured_catalog_sets_charged_amount() {
    let catalog = BoostPlanCatalog::new(
        "mxn",
        [BoostPlan::new(BoostPlanId::Day, 25, DAY_MS).unwrap()],
    )
    .unwrap();
    let h = Harness::with_catalog(catalog).await;

    let boost = h.request_boost("24h").await.unwrap();

    assert_eq!(boost.amount, 25);
    assert_eq!(
        h.processor.intent(&boost.payment_intent_id).unwrap().amount,
        25
    );
    assert!(matches!(
        h.request_boost("1week").await,
        Err(BillingError::InvalidPlan { .. })
    ));
}

#[tokio::test]
async fn boost_of_someone_elses_listing_is_forbidden() {
    let h = Harness::new().await;

    let err = h
        .request_boost_handler()
        .handle(RequestBoostCommand {
            listing_id: h.listing_id,
            plan_id: "24h".to_string(),
            user_id: marketplace_billing::domain::foundation::UserId::new("intruder").unwrap(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BillingError::Forbidden(_)));
    assert!(!h.processor.was_called("create_payment_intent"));
}

// =============================================================================
// Compensation
// =============================================================================

#[tokio::test]
async fn payment_for_missing_listing_is_refunded_exactly_once() {
    let h = Harness::new().await;
    let missing = ListingId::new();

    let result = h
        .deliver(&boost_intent_event(
            "evt_orphan",
            "payment_intent.succeeded",
            "pi_orphan",
            &missing,
            "24h",
            150,
        ))
        .await
        .unwrap();
    assert_eq!(result.outcome.kind(), OutcomeKind::Failed);

    // The charge event for the same payment must not refund again.
    let again = h
        .deliver(&charge_event("evt_orphan_charge", "pi_orphan", 150))
        .await
        .unwrap();

    assert_eq!(again.outcome.kind(), OutcomeKind::Failed);
    assert_eq!(h.processor.refunds().len(), 1);
    assert_eq!(h.processor.call_count("create_refund"), 1);
    assert_eq!(
        ledger_status(&h, &PaymentIntentId::new("pi_orphan").unwrap()).await,
        Some(LedgerStatus::Failed)
    );
}

// =============================================================================
// Status and expiry
// =============================================================================

#[tokio::test]
async fn status_reports_promotion_and_payment_history() {
    let h = Harness::new().await;
    let boost = h.request_boost("24h").await.unwrap();
    h.deliver(&boost_intent_event(
        "evt_boost_1",
        "payment_intent.succeeded",
        boost.payment_intent_id.as_str(),
        &h.listing_id,
        "24h",
        150,
    ))
    .await
    .unwrap();

    let status = h
        .boost_status_handler()
        .handle(GetBoostStatusQuery {
            listing_id: h.listing_id,
            user_id: owner(),
        })
        .await
        .unwrap();

    assert!(status.is_promoted);
    assert_eq!(status.promotion_plan, Some(BoostPlanId::Day));
    assert!(status.remaining_time.is_some());
    assert_eq!(status.payment_history.len(), 1);
}

#[tokio::test]
async fn sweeper_resets_elapsed_promotion() {
    let h = Harness::new().await;
    let boost = h.request_boost("24h").await.unwrap();
    h.deliver(&boost_intent_event(
        "evt_boost_1",
        "payment_intent.succeeded",
        boost.payment_intent_id.as_str(),
        &h.listing_id,
        "24h",
        150,
    ))
    .await
    .unwrap();

    let sweeper = h.sweeper();
    let early = sweeper.sweep().await;
    assert_eq!(early.promotions_expired, Some(0));

    let later = Timestamp::now().minus(Duration::hours(-25));
    let report = sweeper.sweep_at(later).await;

    assert!(report.is_complete());
    assert_eq!(report.promotions_expired, Some(1));
    assert_eq!(
        h.listings.get(&h.listing_id).await.unwrap().promotion,
        Promotion::inactive()
    );
}
