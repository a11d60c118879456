//! GetBoostStatusHandler - Query handler for a listing's promotion state.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{ListingId, Timestamp, UserId};
use crate::domain::ledger::{LedgerStatus, PaymentKind};
use crate::domain::promotion::{BoostPlanId, RemainingTime};
use crate::ports::{ListingRepository, PaymentLedger};

/// Number of boost payments returned with the status.
pub const PAYMENT_HISTORY_LIMIT: u32 = 5;

/// Query for the boost status of a listing.
#[derive(Debug, Clone)]
pub struct GetBoostStatusQuery {
    pub listing_id: ListingId,
    pub user_id: UserId,
}

/// One past boost payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoostPaymentSummary {
    pub amount: i64,
    pub currency: String,
    pub status: LedgerStatus,
    pub plan: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Promotion state as the owner sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBoostStatusResult {
    /// Derived from `promoted_until`, not the stored flag.
    pub is_promoted: bool,
    pub promoted_until: Option<Timestamp>,
    pub promotion_plan: Option<BoostPlanId>,
    pub remaining_time: Option<RemainingTime>,
    pub payment_history: Vec<BoostPaymentSummary>,
}

pub struct GetBoostStatusHandler {
    listings: Arc<dyn ListingRepository>,
    ledger: Arc<dyn PaymentLedger>,
}

impl GetBoostStatusHandler {
    pub fn new(listings: Arc<dyn ListingRepository>, ledger: Arc<dyn PaymentLedger>) -> Self {
        Self { listings, ledger }
    }

    pub async fn handle(
        &self,
        query: GetBoostStatusQuery,
    ) -> Result<GetBoostStatusResult, BillingError> {
        self.handle_at(query, Timestamp::now()).await
    }

    pub async fn handle_at(
        &self,
        query: GetBoostStatusQuery,
        now: Timestamp,
    ) -> Result<GetBoostStatusResult, BillingError> {
        let listing = self
            .listings
            .find_by_id(&query.listing_id)
            .await?
            .ok_or(BillingError::ListingNotFound(query.listing_id))?;

        if !listing.is_owned_by(&query.user_id) {
            return Err(BillingError::forbidden(
                "You can only view the boost status of your own listings",
            ));
        }

        let history = self
            .ledger
            .recent_for_listing(&listing.id, PaymentKind::ListingBoost, PAYMENT_HISTORY_LIMIT)
            .await?
            .into_iter()
            .map(|entry| BoostPaymentSummary {
                plan: entry.plan_id().map(String::from),
                amount: entry.amount,
                currency: entry.currency,
                status: entry.status,
                created_at: entry.created_at,
                completed_at: entry.completed_at,
            })
            .collect();

        let promotion = &listing.promotion;
        let is_promoted = promotion.is_active_at(now);
        Ok(GetBoostStatusResult {
            is_promoted,
            promoted_until: if is_promoted { promotion.promoted_until } else { None },
            promotion_plan: if is_promoted { promotion.plan } else { None },
            remaining_time: promotion.remaining_at(now),
            payment_history: history,
        })
    }
}
