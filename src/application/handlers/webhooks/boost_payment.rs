//! Webhook handlers for one-off boost payments.
//!
//! Success activates the promotion, cancellation clears it, and a failed
//! charge only settles the ledger. Each handler resolves the listing and
//! plan from the intent metadata, falling back to the ledger entry for
//! charge events that carry no metadata of their own.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use super::compensation::{is_compensated, CompensationTarget, RefundCompensator};
use crate::application::handlers::billing::{META_LISTING_ID, META_USER_ID};
use crate::domain::foundation::{ListingId, PaymentIntentId, Timestamp, UserId};
use crate::domain::ledger::{LedgerEntry, LedgerStatus, NewLedgerEntry, PaymentKind, META_PLAN_ID};
use crate::domain::promotion::{BoostPlan, BoostPlanCatalog, Listing, Promotion};
use crate::domain::webhook::{
    ChargeObject, PaymentIntentObject, ProcessorEvent, ProcessorEventType, WebhookError,
    WebhookEventHandler, WebhookOutcome,
};
use crate::ports::{ListingRepository, PaymentLedger, PromotionWrite};

/// Listing id key written by older clients.
pub const LEGACY_META_LISTING_ID: &str = "serviceId";

/// Number of recent boost payments checked before clearing a promotion.
const ACTIVE_BOOST_SCAN_LIMIT: u32 = 10;

/// The payment a boost event refers to.
struct BoostPayment {
    payment_intent_id: PaymentIntentId,
    amount: i64,
    currency: Option<String>,
    metadata: HashMap<String, String>,
}

impl BoostPayment {
    fn from_intent(event: &ProcessorEvent) -> Result<Self, WebhookError> {
        let intent: PaymentIntentObject = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        Ok(Self {
            payment_intent_id: PaymentIntentId::new(intent.id)
                .map_err(|_| WebhookError::MissingField("id"))?,
            amount: intent.amount_received.unwrap_or(intent.amount),
            currency: intent.currency,
            metadata: intent.metadata,
        })
    }

    /// `None` for charges not created through a payment intent.
    fn from_charge(event: &ProcessorEvent) -> Result<Option<Self>, WebhookError> {
        let charge: ChargeObject = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let Some(intent_id) = charge.payment_intent.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        Ok(Some(Self {
            payment_intent_id: PaymentIntentId::new(intent_id)
                .map_err(|_| WebhookError::MissingField("payment_intent"))?,
            amount: charge.amount,
            currency: charge.currency,
            metadata: charge.metadata,
        }))
    }
}

/// Listing, plan and payer of a boost, from metadata or the ledger entry.
#[derive(Debug, Default)]
struct BoostReference {
    listing_id: Option<ListingId>,
    plan_id: Option<String>,
    user_id: Option<UserId>,
}

impl BoostReference {
    fn resolve(
        metadata: &HashMap<String, String>,
        entry: Option<&LedgerEntry>,
    ) -> Result<Self, WebhookError> {
        let raw_listing = metadata
            .get(META_LISTING_ID)
            .or_else(|| metadata.get(LEGACY_META_LISTING_ID))
            .filter(|s| !s.is_empty());
        let listing_id = match raw_listing {
            Some(raw) => Some(raw.parse::<ListingId>().map_err(|e| {
                WebhookError::InvalidMetadata {
                    field: "listingId",
                    reason: e.to_string(),
                }
            })?),
            None => entry.and_then(|e| e.listing_id),
        };

        let plan_id = metadata
            .get(META_PLAN_ID)
            .filter(|s| !s.is_empty())
            .cloned()
            .or_else(|| entry.and_then(|e| e.plan_id()).map(String::from));

        let user_id = metadata
            .get(META_USER_ID)
            .and_then(|raw| UserId::new(raw.clone()).ok())
            .or_else(|| entry.map(|e| e.user_id.clone()));

        Ok(Self {
            listing_id,
            plan_id,
            user_id,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// payment_intent.succeeded / charge.succeeded
// ════════════════════════════════════════════════════════════════════════════════

/// Activates the promotion a boost payment paid for.
///
/// `promoted_until` is anchored on the ledger's completion time once the
/// entry has succeeded, and on the time the payment is first applied before
/// that, so redeliveries and the charge/intent event pair write identical
/// values. The listing records the paying intent; a promotion that cannot be
/// written, or that would replace another payment's running promotion, is
/// refunded.
pub struct BoostPaymentSucceededHandler {
    listings: Arc<dyn ListingRepository>,
    ledger: Arc<dyn PaymentLedger>,
    catalog: Arc<BoostPlanCatalog>,
    compensator: Arc<RefundCompensator>,
}

impl BoostPaymentSucceededHandler {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        ledger: Arc<dyn PaymentLedger>,
        catalog: Arc<BoostPlanCatalog>,
        compensator: Arc<RefundCompensator>,
    ) -> Self {
        Self {
            listings,
            ledger,
            catalog,
            compensator,
        }
    }

    pub async fn handle_at(
        &self,
        event: &ProcessorEvent,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        // 1. Identify the payment
        let payment = match event.parsed_type() {
            ProcessorEventType::ChargeSucceeded => match BoostPayment::from_charge(event)? {
                Some(payment) => payment,
                None => return Ok(WebhookOutcome::ignored("charge without payment intent")),
            },
            _ => BoostPayment::from_intent(event)?,
        };

        // 2. Check what the ledger already knows
        let entry = self
            .ledger
            .find_by_payment_intent(&payment.payment_intent_id)
            .await?;
        if let Some(entry) = &entry {
            if entry.kind == PaymentKind::PremiumSubscription {
                return Ok(WebhookOutcome::ignored(
                    "premium payments are reconciled from invoices",
                ));
            }
            if is_compensated(entry) {
                return Ok(WebhookOutcome::failed("payment already refunded"));
            }
        }

        // 3. Resolve listing and plan
        let reference = BoostReference::resolve(&payment.metadata, entry.as_ref())?;
        let Some(listing_id) = reference.listing_id else {
            return Ok(WebhookOutcome::ignored("not a listing boost"));
        };
        let raw_plan = reference
            .plan_id
            .as_deref()
            .ok_or(WebhookError::MissingMetadata("planId"))?;
        let plan = *self
            .catalog
            .resolve(raw_plan)
            .map_err(|e| WebhookError::InvalidMetadata {
                field: "planId",
                reason: e.to_string(),
            })?;

        let Some(listing) = self.listings.find_by_id(&listing_id).await? else {
            let cause = format!("listing {} not found", listing_id);
            return Ok(self.compensate(&payment, &reference, entry, &cause, now).await);
        };

        // 4. Anchor on this payment's first application
        let settled_at = entry
            .as_ref()
            .filter(|e| e.status == LedgerStatus::Succeeded)
            .and_then(|e| e.completed_at);
        if let Some(settled_at) = settled_at {
            if !Promotion::activated(&plan, settled_at).is_active_at(now) {
                return Ok(WebhookOutcome::ignored("promotion already ran its course"));
            }
        }
        let anchor = settled_at
            .or_else(|| applied_start(&listing.promotion, &payment.payment_intent_id, &plan))
            .unwrap_or(now);

        // 5. Activate; refund when the listing cannot take the promotion
        let promotion = match self.activate(&listing, &plan, &payment, anchor, now).await {
            Ok(promotion) => promotion,
            Err(cause) => {
                return Ok(self.compensate(&payment, &reference, entry, &cause, now).await);
            }
        };

        // 6. Settle the ledger
        self.record_success(entry, &payment, &reference, &plan, &listing, anchor)
            .await?;

        let until = promotion.promoted_until.unwrap_or(anchor);
        info!(
            listing_id = %listing_id,
            plan = %plan.id,
            payment_intent_id = %payment.payment_intent_id,
            promoted_until = %until,
            "Listing promoted"
        );
        Ok(WebhookOutcome::applied(format!(
            "listing {} promoted until {}",
            listing_id, until
        )))
    }

    /// Writes the promotion. `Err` carries the cause used for compensation.
    async fn activate(
        &self,
        listing: &Listing,
        plan: &BoostPlan,
        payment: &BoostPayment,
        anchor: Timestamp,
        now: Timestamp,
    ) -> Result<Promotion, String> {
        let superseded = || format!("listing {} already promoted by another payment", listing.id);
        let promotion = listing
            .promotion
            .activate(plan, &payment.payment_intent_id, anchor, now)
            .map_err(|_| superseded())?;

        match self
            .listings
            .activate_promotion(&listing.id, &promotion, now)
            .await
        {
            Ok(PromotionWrite::Applied) => Ok(promotion),
            Ok(PromotionWrite::Rejected(_)) => Err(superseded()),
            Ok(PromotionWrite::NotFound) => Err(format!("listing {} not found", listing.id)),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn compensate(
        &self,
        payment: &BoostPayment,
        reference: &BoostReference,
        entry: Option<LedgerEntry>,
        cause: &str,
        now: Timestamp,
    ) -> WebhookOutcome {
        let target = CompensationTarget {
            payment_intent_id: payment.payment_intent_id.clone(),
            user_id: reference.user_id.clone(),
            amount: payment.amount,
            currency: self.currency(payment),
            kind: entry.as_ref().map_or(PaymentKind::WebhookProcessing, |e| e.kind),
            entry,
        };
        self.compensator.compensate(target, cause, now).await
    }

    fn currency(&self, payment: &BoostPayment) -> String {
        payment
            .currency
            .clone()
            .unwrap_or_else(|| self.catalog.currency().to_string())
    }

    async fn record_success(
        &self,
        entry: Option<LedgerEntry>,
        payment: &BoostPayment,
        reference: &BoostReference,
        plan: &BoostPlan,
        listing: &Listing,
        anchor: Timestamp,
    ) -> Result<(), WebhookError> {
        match entry {
            Some(mut entry) => match entry.status {
                LedgerStatus::Pending => {
                    entry.settle(LedgerStatus::Succeeded, None, anchor)?;
                    self.ledger.update_status(&entry).await?;
                }
                LedgerStatus::Succeeded => {}
                other => warn!(
                    payment_intent_id = %entry.payment_intent_id,
                    status = %other,
                    "Boost payment succeeded after its ledger entry settled"
                ),
            },
            None => {
                let user_id = reference
                    .user_id
                    .clone()
                    .unwrap_or_else(|| listing.owner_id.clone());
                let mut metadata = BTreeMap::new();
                metadata.insert(META_PLAN_ID.to_string(), plan.id.to_string());
                let entry = LedgerEntry::settled(
                    NewLedgerEntry {
                        payment_intent_id: payment.payment_intent_id.clone(),
                        user_id,
                        listing_id: Some(listing.id),
                        amount: payment.amount,
                        currency: self.currency(payment),
                        kind: PaymentKind::WebhookProcessing,
                        metadata,
                    },
                    LedgerStatus::Succeeded,
                    None,
                    anchor,
                );
                self.ledger.insert_if_absent(&entry).await?;
            }
        }
        Ok(())
    }
}

/// Start of the promotion `payment_intent_id` already wrote to the listing.
fn applied_start(
    promotion: &Promotion,
    payment_intent_id: &PaymentIntentId,
    plan: &BoostPlan,
) -> Option<Timestamp> {
    if !promotion.is_paid_by(payment_intent_id) {
        return None;
    }
    promotion
        .promoted_until
        .map(|until| until.plus_millis(-plan.duration_ms))
}

#[async_trait]
impl WebhookEventHandler for BoostPaymentSucceededHandler {
    fn handles(&self) -> Vec<ProcessorEventType> {
        vec![
            ProcessorEventType::PaymentIntentSucceeded,
            ProcessorEventType::ChargeSucceeded,
        ]
    }

    async fn handle(&self, event: &ProcessorEvent) -> Result<WebhookOutcome, WebhookError> {
        self.handle_at(event, Timestamp::now()).await
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// payment_intent.canceled
// ════════════════════════════════════════════════════════════════════════════════

/// Clears the promotion of a canceled boost payment and settles its entry.
///
/// A promotion paid by a different, still running boost is left in place.
pub struct BoostPaymentCanceledHandler {
    listings: Arc<dyn ListingRepository>,
    ledger: Arc<dyn PaymentLedger>,
    catalog: Arc<BoostPlanCatalog>,
}

impl BoostPaymentCanceledHandler {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        ledger: Arc<dyn PaymentLedger>,
        catalog: Arc<BoostPlanCatalog>,
    ) -> Self {
        Self {
            listings,
            ledger,
            catalog,
        }
    }

    pub async fn handle_at(
        &self,
        event: &ProcessorEvent,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        let intent: PaymentIntentObject = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let payment_intent_id =
            PaymentIntentId::new(intent.id.clone()).map_err(|_| WebhookError::MissingField("id"))?;

        let entry = self.ledger.find_by_payment_intent(&payment_intent_id).await?;
        if let Some(entry) = &entry {
            if entry.status == LedgerStatus::Succeeded {
                return Ok(WebhookOutcome::ignored("payment already succeeded"));
            }
        }

        let reference = BoostReference::resolve(&intent.metadata, entry.as_ref())?;

        let cleared = match reference.listing_id {
            Some(listing_id) => {
                self.clear_promotion(&listing_id, &payment_intent_id, now)
                    .await?
            }
            None => false,
        };

        let settled = match entry {
            Some(mut entry) => {
                let changed =
                    entry.settle(LedgerStatus::Canceled, intent.cancellation_reason.clone(), now);
                match changed {
                    Ok(true) => self.ledger.update_status(&entry).await?,
                    Ok(false) => false,
                    // Failed entries stay failed
                    Err(_) => false,
                }
            }
            None => false,
        };

        if reference.listing_id.is_none() && !settled {
            return Ok(WebhookOutcome::ignored("not a listing boost"));
        }

        info!(
            payment_intent_id = %payment_intent_id,
            promotion_cleared = cleared,
            "Boost payment canceled"
        );
        Ok(WebhookOutcome::applied(if cleared {
            "payment canceled, promotion cleared"
        } else {
            "payment canceled"
        }))
    }

    async fn clear_promotion(
        &self,
        listing_id: &ListingId,
        canceled: &PaymentIntentId,
        now: Timestamp,
    ) -> Result<bool, WebhookError> {
        let Some(listing) = self.listings.find_by_id(listing_id).await? else {
            return Ok(false);
        };
        if !listing.promotion.is_promoted {
            return Ok(false);
        }
        let cleared = if listing.promotion.is_active_at(now) {
            let paid_by_other = match &listing.promotion.paid_by {
                Some(paid_by) => paid_by != canceled,
                None => self.has_other_active_boost(listing_id, canceled, now).await?,
            };
            if paid_by_other {
                return Ok(false);
            }
            listing.promotion.deactivate(now)?
        } else {
            Promotion::inactive()
        };
        Ok(self.listings.set_promotion(listing_id, &cleared).await?)
    }

    async fn has_other_active_boost(
        &self,
        listing_id: &ListingId,
        canceled: &PaymentIntentId,
        now: Timestamp,
    ) -> Result<bool, WebhookError> {
        let recent = self
            .ledger
            .recent_for_listing(listing_id, PaymentKind::ListingBoost, ACTIVE_BOOST_SCAN_LIMIT)
            .await?;
        let mut other_paid = self
            .ledger
            .recent_for_listing(listing_id, PaymentKind::WebhookProcessing, ACTIVE_BOOST_SCAN_LIMIT)
            .await?;
        other_paid.extend(recent);

        Ok(other_paid.iter().any(|e| {
            &e.payment_intent_id != canceled
                && e.status == LedgerStatus::Succeeded
                && match (e.completed_at, e.plan_id().and_then(|p| self.catalog.resolve(p).ok())) {
                    (Some(at), Some(plan)) => Promotion::activated(plan, at).is_active_at(now),
                    _ => false,
                }
        }))
    }
}

#[async_trait]
impl WebhookEventHandler for BoostPaymentCanceledHandler {
    fn handles(&self) -> Vec<ProcessorEventType> {
        vec![ProcessorEventType::PaymentIntentCanceled]
    }

    async fn handle(&self, event: &ProcessorEvent) -> Result<WebhookOutcome, WebhookError> {
        self.handle_at(event, Timestamp::now()).await
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// payment_intent.payment_failed
// ════════════════════════════════════════════════════════════════════════════════

/// Records a failed charge attempt. Listing and premium state are untouched.
pub struct PaymentFailedHandler {
    ledger: Arc<dyn PaymentLedger>,
    catalog: Arc<BoostPlanCatalog>,
}

impl PaymentFailedHandler {
    pub fn new(ledger: Arc<dyn PaymentLedger>, catalog: Arc<BoostPlanCatalog>) -> Self {
        Self { ledger, catalog }
    }

    pub async fn handle_at(
        &self,
        event: &ProcessorEvent,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        let intent: PaymentIntentObject = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let payment_intent_id =
            PaymentIntentId::new(intent.id.clone()).map_err(|_| WebhookError::MissingField("id"))?;
        let message = intent
            .last_payment_error
            .as_ref()
            .and_then(|e| e.message.clone().or_else(|| e.code.clone()))
            .unwrap_or_else(|| "payment failed".to_string());

        match self.ledger.find_by_payment_intent(&payment_intent_id).await? {
            Some(mut entry) => {
                if entry.status != LedgerStatus::Pending {
                    return Ok(WebhookOutcome::ignored(format!(
                        "ledger entry already {}",
                        entry.status
                    )));
                }
                entry.settle(LedgerStatus::Failed, Some(message.clone()), now)?;
                self.ledger.update_status(&entry).await?;
            }
            None => {
                let reference = BoostReference::resolve(&intent.metadata, None)?;
                let (Some(listing_id), Some(user_id)) = (reference.listing_id, reference.user_id)
                else {
                    return Ok(WebhookOutcome::ignored("unknown payment"));
                };
                let mut metadata = BTreeMap::new();
                if let Some(plan) = reference.plan_id {
                    metadata.insert(META_PLAN_ID.to_string(), plan);
                }
                let entry = LedgerEntry::settled(
                    NewLedgerEntry {
                        payment_intent_id: payment_intent_id.clone(),
                        user_id,
                        listing_id: Some(listing_id),
                        amount: intent.amount,
                        currency: intent
                            .currency
                            .clone()
                            .unwrap_or_else(|| self.catalog.currency().to_string()),
                        kind: PaymentKind::WebhookProcessing,
                        metadata,
                    },
                    LedgerStatus::Failed,
                    Some(message.clone()),
                    now,
                );
                self.ledger.insert_if_absent(&entry).await?;
            }
        }

        info!(
            payment_intent_id = %payment_intent_id,
            reason = %message,
            "Payment failure recorded"
        );
        Ok(WebhookOutcome::applied("payment failure recorded"))
    }
}

#[async_trait]
impl WebhookEventHandler for PaymentFailedHandler {
    fn handles(&self) -> Vec<ProcessorEventType> {
        vec![ProcessorEventType::PaymentIntentPaymentFailed]
    }

    async fn handle(&self, event: &ProcessorEvent) -> Result<WebhookOutcome, WebhookError> {
        self.handle_at(event, Timestamp::now()).await
    }
}
