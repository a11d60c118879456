//! RequestBoostHandler - Command handler for starting a listing boost payment.

use chrono::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::billing::BillingError;
use crate::domain::foundation::{ListingId, PaymentIntentId, Timestamp, UserId};
use crate::domain::ledger::{LedgerEntry, LedgerStatus, NewLedgerEntry, PaymentKind, META_PLAN_ID};
use crate::domain::promotion::{BoostPlan, BoostPlanCatalog, BoostPlanId};
use crate::ports::{
    CreatePaymentIntentRequest, LedgerInsert, ListingRepository, PaymentIntent,
    PaymentIntentStatus, PaymentLedger, PaymentProcessor,
};

/// Metadata keys written on boost payment intents.
pub const META_LISTING_ID: &str = "listingId";
pub const META_USER_ID: &str = "userId";

/// Default window in which a pending boost payment is reused.
pub const DEFAULT_FRESHNESS_WINDOW_MINUTES: i64 = 15;

/// Command to request a boost for a listing.
#[derive(Debug, Clone)]
pub struct RequestBoostCommand {
    pub listing_id: ListingId,
    /// Raw plan id as sent by the client.
    pub plan_id: String,
    pub user_id: UserId,
}

/// Payment handle the client confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBoostResult {
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub payment_intent_id: PaymentIntentId,
    pub status: PaymentIntentStatus,
    /// An earlier pending intent was returned instead of a new one.
    pub reused: bool,
}

impl RequestBoostResult {
    fn from_intent(intent: PaymentIntent, reused: bool) -> Self {
        Self {
            client_secret: intent.client_secret,
            amount: intent.amount,
            currency: intent.currency,
            payment_intent_id: intent.id,
            status: intent.status,
            reused,
        }
    }
}

/// Handler for boost payment requests.
///
/// Validation and ownership are checked before any processor call. A listing
/// has at most one open boost payment: a second request for the same plan
/// within the freshness window gets the first intent back, a request for
/// another plan is a conflict, and an open payment older than the window is
/// canceled before a new one starts. The idempotency key counts the
/// listing's boost attempts, so concurrent requests share one key and the
/// ledger settles any race that slips past it.
pub struct RequestBoostHandler {
    listings: Arc<dyn ListingRepository>,
    ledger: Arc<dyn PaymentLedger>,
    processor: Arc<dyn PaymentProcessor>,
    catalog: Arc<BoostPlanCatalog>,
    freshness_window: Duration,
}

impl RequestBoostHandler {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        ledger: Arc<dyn PaymentLedger>,
        processor: Arc<dyn PaymentProcessor>,
        catalog: Arc<BoostPlanCatalog>,
    ) -> Self {
        Self {
            listings,
            ledger,
            processor,
            catalog,
            freshness_window: Duration::minutes(DEFAULT_FRESHNESS_WINDOW_MINUTES),
        }
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub async fn handle(&self, cmd: RequestBoostCommand) -> Result<RequestBoostResult, BillingError> {
        self.handle_at(cmd, Timestamp::now()).await
    }

    pub async fn handle_at(
        &self,
        cmd: RequestBoostCommand,
        now: Timestamp,
    ) -> Result<RequestBoostResult, BillingError> {
        // 1. Load listing and check ownership
        let listing = self
            .listings
            .find_by_id(&cmd.listing_id)
            .await?
            .ok_or(BillingError::ListingNotFound(cmd.listing_id))?;

        if !listing.is_owned_by(&cmd.user_id) {
            return Err(BillingError::forbidden("You can only boost your own listings"));
        }

        // 2. Resolve plan
        let plan = *self
            .catalog
            .resolve(&cmd.plan_id)
            .map_err(|_| BillingError::invalid_plan(&cmd.plan_id, self.catalog.plan_names()))?;

        // 3. Reject while a promotion is running
        if let Some(remaining) = listing.promotion.remaining_at(now) {
            if let Some(promoted_until) = listing.promotion.promoted_until {
                return Err(BillingError::AlreadyPromoted {
                    promoted_until,
                    remaining,
                });
            }
        }

        // 4. Resolve the listing's open payment
        if let Some(pending) = self.ledger.find_pending_boost(&listing.id).await? {
            if let Some(intent) = self.resume_pending(pending, &plan, now).await? {
                info!(
                    listing_id = %listing.id,
                    payment_intent_id = %intent.id,
                    "Returning pending boost payment"
                );
                return Ok(RequestBoostResult::from_intent(intent, true));
            }
        }

        // 5. Create the intent
        let attempt = self
            .ledger
            .count_for_listing(&listing.id, PaymentKind::ListingBoost)
            .await?;
        let mut intent = self
            .create_intent(&cmd, &plan, idempotency_key(&cmd, &plan, attempt, None))
            .await?;
        if !intent.status.is_awaitable() {
            // The key already produced an intent the client can no longer use
            intent = self
                .create_intent(&cmd, &plan, idempotency_key(&cmd, &plan, attempt, Some(now)))
                .await?;
        }

        // 6. Record it as pending; a concurrent request may already have
        let entry = LedgerEntry::pending(
            NewLedgerEntry {
                payment_intent_id: intent.id.clone(),
                user_id: cmd.user_id.clone(),
                listing_id: Some(listing.id),
                amount: plan.amount,
                currency: self.catalog.currency().to_string(),
                kind: PaymentKind::ListingBoost,
                metadata: boost_metadata(&cmd, &plan),
            },
            now,
        );
        let reused = match self.ledger.insert_if_absent(&entry).await? {
            LedgerInsert::Inserted => false,
            LedgerInsert::Existing(existing) if existing.payment_intent_id == intent.id => true,
            LedgerInsert::Existing(existing) => {
                return self.yield_to(intent, existing, &plan, now).await;
            }
        };

        info!(
            listing_id = %listing.id,
            plan = %plan.id,
            payment_intent_id = %intent.id,
            amount = plan.amount,
            "Boost payment intent created"
        );

        Ok(RequestBoostResult::from_intent(intent, reused))
    }

    /// Returns the open intent if the client should complete it.
    ///
    /// `None` means the entry no longer blocks the listing: its intent was
    /// canceled, vanished, or was older than the freshness window and is
    /// canceled here.
    async fn resume_pending(
        &self,
        mut pending: LedgerEntry,
        plan: &BoostPlan,
        now: Timestamp,
    ) -> Result<Option<PaymentIntent>, BillingError> {
        let intent = self
            .processor
            .retrieve_payment_intent(&pending.payment_intent_id)
            .await?;

        let reason = match intent {
            Some(intent) if intent.status == PaymentIntentStatus::Succeeded => {
                return Err(BillingError::DuplicatePayment(intent.id));
            }
            Some(intent) if intent.status.is_awaitable() => {
                if pending.is_fresh_pending(now, self.freshness_window) {
                    if pending.plan_id() == Some(plan.id.as_str()) {
                        return Ok(Some(intent));
                    }
                    return Err(in_progress(&pending));
                }
                self.processor.cancel_payment_intent(&intent.id).await?;
                info!(
                    payment_intent_id = %intent.id,
                    "Canceled abandoned boost payment"
                );
                "abandoned"
            }
            Some(intent) if intent.status == PaymentIntentStatus::Canceled => "canceled",
            Some(_) => return Err(in_progress(&pending)),
            None => {
                warn!(
                    payment_intent_id = %pending.payment_intent_id,
                    "Pending boost intent unknown to processor"
                );
                "unknown to processor"
            }
        };

        if pending.settle(LedgerStatus::Canceled, Some(reason.to_string()), now)? {
            self.ledger.update_status(&pending).await?;
        }
        Ok(None)
    }

    /// Another request recorded its payment first: drop `ours` in its favor.
    async fn yield_to(
        &self,
        ours: PaymentIntent,
        existing: LedgerEntry,
        plan: &BoostPlan,
        now: Timestamp,
    ) -> Result<RequestBoostResult, BillingError> {
        if let Err(e) = self.processor.cancel_payment_intent(&ours.id).await {
            warn!(
                payment_intent_id = %ours.id,
                error = %e,
                "Could not cancel superseded boost intent"
            );
        }
        let blocking = in_progress(&existing);
        match self.resume_pending(existing, plan, now).await? {
            Some(intent) => Ok(RequestBoostResult::from_intent(intent, true)),
            None => Err(blocking),
        }
    }

    async fn create_intent(
        &self,
        cmd: &RequestBoostCommand,
        plan: &BoostPlan,
        idempotency_key: String,
    ) -> Result<PaymentIntent, BillingError> {
        let mut metadata = boost_metadata(cmd, plan);
        metadata.insert(META_USER_ID.to_string(), cmd.user_id.to_string());
        Ok(self
            .processor
            .create_payment_intent(CreatePaymentIntentRequest {
                amount: plan.amount,
                currency: self.catalog.currency().to_string(),
                metadata,
                idempotency_key,
            })
            .await?)
    }
}

/// `boost-{listing}-{plan}-{attempt}`, where `attempt` counts the listing's
/// earlier boost payments. `retry_at` appends milliseconds for a key that
/// must not replay.
fn idempotency_key(
    cmd: &RequestBoostCommand,
    plan: &BoostPlan,
    attempt: u64,
    retry_at: Option<Timestamp>,
) -> String {
    let key = format!("boost-{}-{}-{}", cmd.listing_id, plan.id, attempt);
    match retry_at {
        Some(at) => format!("{}-{}", key, at.as_datetime().timestamp_millis()),
        None => key,
    }
}

fn in_progress(pending: &LedgerEntry) -> BillingError {
    BillingError::PaymentInProgress {
        payment_intent_id: pending.payment_intent_id.clone(),
        plan: pending.plan_id().and_then(|p| p.parse::<BoostPlanId>().ok()),
    }
}

fn boost_metadata(cmd: &RequestBoostCommand, plan: &BoostPlan) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert(META_LISTING_ID.to_string(), cmd.listing_id.to_string());
    metadata.insert(META_PLAN_ID.to_string(), plan.id.as_str().to_string());
    metadata
}
