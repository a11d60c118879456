//! Payment ledger entries.
//!
//! One entry per processor payment reference. Status moves forward only:
//! `pending` settles into exactly one of `succeeded`, `failed` or `canceled`.
//! Settling overwrites the status in place; the entry does not keep a
//! per-transition history.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{
    LedgerEntryId, ListingId, PaymentIntentId, StateMachine, Timestamp, UserId, ValidationError,
};

/// Metadata key holding the boost plan id.
pub const META_PLAN_ID: &str = "planId";

/// Settlement status of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Succeeded => "succeeded",
            LedgerStatus::Failed => "failed",
            LedgerStatus::Canceled => "canceled",
        }
    }
}

impl StateMachine for LedgerStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        matches!(
            (self, target),
            (LedgerStatus::Pending, LedgerStatus::Succeeded)
                | (LedgerStatus::Pending, LedgerStatus::Failed)
                | (LedgerStatus::Pending, LedgerStatus::Canceled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            LedgerStatus::Pending => vec![
                LedgerStatus::Succeeded,
                LedgerStatus::Failed,
                LedgerStatus::Canceled,
            ],
            _ => vec![],
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LedgerStatus::Pending),
            "succeeded" => Ok(LedgerStatus::Succeeded),
            "failed" => Ok(LedgerStatus::Failed),
            "canceled" => Ok(LedgerStatus::Canceled),
            other => Err(ValidationError::invalid_format(
                "ledger_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// What a ledger entry paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    ListingBoost,
    PremiumSubscription,
    /// Recorded by the reconciler for a payment it had no pending entry for.
    WebhookProcessing,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::ListingBoost => "listing_boost",
            PaymentKind::PremiumSubscription => "premium_subscription",
            PaymentKind::WebhookProcessing => "webhook_processing",
        }
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listing_boost" => Ok(PaymentKind::ListingBoost),
            "premium_subscription" => Ok(PaymentKind::PremiumSubscription),
            "webhook_processing" => Ok(PaymentKind::WebhookProcessing),
            other => Err(ValidationError::invalid_format(
                "payment_kind",
                format!("unknown kind '{}'", other),
            )),
        }
    }
}

/// A recorded payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    /// Processor payment intent id; subscription charges use the
    /// subscription or invoice id.
    pub payment_intent_id: PaymentIntentId,
    pub user_id: UserId,
    pub listing_id: Option<ListingId>,
    pub amount: i64,
    pub currency: String,
    pub status: LedgerStatus,
    pub kind: PaymentKind,
    pub error_message: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Fields needed to open a new entry.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub payment_intent_id: PaymentIntentId,
    pub user_id: UserId,
    pub listing_id: Option<ListingId>,
    pub amount: i64,
    pub currency: String,
    pub kind: PaymentKind,
    pub metadata: BTreeMap<String, String>,
}

impl LedgerEntry {
    /// Opens a `pending` entry at intent-creation time.
    pub fn pending(new: NewLedgerEntry, now: Timestamp) -> Self {
        Self {
            id: LedgerEntryId::new(),
            payment_intent_id: new.payment_intent_id,
            user_id: new.user_id,
            listing_id: new.listing_id,
            amount: new.amount,
            currency: new.currency,
            status: LedgerStatus::Pending,
            kind: new.kind,
            error_message: None,
            metadata: new.metadata,
            created_at: now,
            completed_at: None,
        }
    }

    /// Entry for a payment first seen in a webhook, already settled.
    pub fn settled(
        new: NewLedgerEntry,
        status: LedgerStatus,
        error_message: Option<String>,
        now: Timestamp,
    ) -> Self {
        let mut entry = Self::pending(new, now);
        if status != LedgerStatus::Pending {
            entry.status = status;
            entry.error_message = error_message;
            entry.completed_at = Some(now);
        }
        entry
    }

    /// Moves to `target`.
    ///
    /// Returns `Ok(false)` if the entry already has that status, so redelivered
    /// events are no-ops. Settled entries reject any other target.
    pub fn settle(
        &mut self,
        target: LedgerStatus,
        error_message: Option<String>,
        now: Timestamp,
    ) -> Result<bool, ValidationError> {
        if self.status == target {
            return Ok(false);
        }
        self.status = self.status.transition_to(target)?;
        self.error_message = error_message;
        self.completed_at = Some(now);
        Ok(true)
    }

    /// Pending and created within `window` of `now`.
    pub fn is_fresh_pending(&self, now: Timestamp, window: Duration) -> bool {
        self.status == LedgerStatus::Pending && !self.created_at.is_before(&now.minus(window))
    }

    pub fn plan_id(&self) -> Option<&str> {
        self.metadata.get(META_PLAN_ID).map(String::as_str)
    }
}
