//! Listing aggregate subset and its promotion state.
//!
//! A listing is promoted only while `promoted_until` lies in the future.
//! The stored flag can lag behind the clock until the sweeper runs, so every
//! read goes through [`Promotion::is_active_at`].

use serde::{Deserialize, Serialize};

use super::plan::{BoostPlan, BoostPlanId};
use crate::domain::foundation::{
    ListingId, PaymentIntentId, StateMachine, Timestamp, UserId, ValidationError,
};

/// Lifecycle phase of a listing promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionPhase {
    Inactive,
    Active,
}

impl StateMachine for PromotionPhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            PromotionPhase::Inactive => vec![PromotionPhase::Active],
            PromotionPhase::Active => vec![PromotionPhase::Inactive],
        }
    }
}

/// Time left on an active promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingTime {
    pub hours: i64,
    pub minutes: i64,
    pub total_millis: i64,
}

impl RemainingTime {
    /// Remaining time from `now` until `until`, `None` once elapsed.
    pub fn between(now: Timestamp, until: Timestamp) -> Option<Self> {
        let total_millis = until.duration_since(&now).num_milliseconds();
        if total_millis <= 0 {
            return None;
        }
        Some(Self {
            hours: total_millis / 3_600_000,
            minutes: (total_millis % 3_600_000) / 60_000,
            total_millis,
        })
    }
}

/// Persisted promotion fields of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Promotion {
    pub is_promoted: bool,
    pub promoted_until: Option<Timestamp>,
    pub plan: Option<BoostPlanId>,
    /// Payment intent that bought the promotion.
    #[serde(default)]
    pub paid_by: Option<PaymentIntentId>,
}

impl Promotion {
    /// The not-promoted state.
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Promotion granted by a successful boost payment observed at `now`.
    pub fn activated(plan: &BoostPlan, now: Timestamp) -> Self {
        Self {
            is_promoted: true,
            promoted_until: Some(now.plus_millis(plan.duration_ms)),
            plan: Some(plan.id),
            paid_by: None,
        }
    }

    pub fn with_payment(mut self, payment_intent_id: PaymentIntentId) -> Self {
        self.paid_by = Some(payment_intent_id);
        self
    }

    pub fn is_paid_by(&self, payment_intent_id: &PaymentIntentId) -> bool {
        self.paid_by.as_ref() == Some(payment_intent_id)
    }

    /// Promotion bought by `payment_intent_id`, running from `start`.
    ///
    /// Moves the listing from inactive to active at `now`. Re-applying the
    /// promotion of the same payment is accepted; a running promotion of any
    /// other payment is not.
    pub fn activate(
        &self,
        plan: &BoostPlan,
        payment_intent_id: &PaymentIntentId,
        start: Timestamp,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let next = Self::activated(plan, start).with_payment(payment_intent_id.clone());
        if !self.is_paid_by(payment_intent_id) {
            self.phase_at(now).transition_to(PromotionPhase::Active)?;
        }
        Ok(next)
    }

    /// Ends a running promotion at `now`.
    pub fn deactivate(&self, now: Timestamp) -> Result<Self, ValidationError> {
        self.phase_at(now).transition_to(PromotionPhase::Inactive)?;
        Ok(Self::inactive())
    }

    /// Whether `next` may be written over this promotion at `now`.
    pub fn admits(&self, next: &Promotion, now: Timestamp) -> bool {
        let same_payment = next.paid_by.is_some() && next.paid_by == self.paid_by;
        same_payment || self.phase_at(now).can_transition_to(&PromotionPhase::Active)
    }

    /// Derived read: promoted and the window has not elapsed.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        self.is_promoted && self.promoted_until.is_some_and(|until| until.is_after(&now))
    }

    pub fn phase_at(&self, now: Timestamp) -> PromotionPhase {
        if self.is_active_at(now) {
            PromotionPhase::Active
        } else {
            PromotionPhase::Inactive
        }
    }

    /// Stored as promoted although the window is over; the sweeper resets these.
    pub fn is_stale_at(&self, now: Timestamp) -> bool {
        self.is_promoted && !self.is_active_at(now)
    }

    pub fn remaining_at(&self, now: Timestamp) -> Option<RemainingTime> {
        if !self.is_active_at(now) {
            return None;
        }
        self.promoted_until
            .and_then(|until| RemainingTime::between(now, until))
    }
}

/// The part of a service listing that billing reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub owner_id: UserId,
    pub promotion: Promotion,
}

impl Listing {
    pub fn new(id: ListingId, owner_id: UserId) -> Self {
        Self {
            id,
            owner_id,
            promotion: Promotion::inactive(),
        }
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner_id == user_id
    }
}
