//! Subscription snapshots and the one rule that turns them into premium state.
//!
//! Webhook handlers and the reconciliation path both build a
//! [`SubscriptionSnapshot`] and call [`apply_subscription_snapshot`], so the
//! fallback order for `premium_until` lives in one place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::domain::foundation::{SubscriptionId, Timestamp};

/// Default premium window when the processor reports no period end.
pub const DEFAULT_FALLBACK_PERIOD_DAYS: i64 = 30;

/// Subscription status as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Paused,
    Unknown(String),
}

impl SubscriptionState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "incomplete" => SubscriptionState::Incomplete,
            "incomplete_expired" => SubscriptionState::IncompleteExpired,
            "trialing" => SubscriptionState::Trialing,
            "active" => SubscriptionState::Active,
            "past_due" => SubscriptionState::PastDue,
            "canceled" => SubscriptionState::Canceled,
            "unpaid" => SubscriptionState::Unpaid,
            "paused" => SubscriptionState::Paused,
            other => SubscriptionState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionState::Incomplete => "incomplete",
            SubscriptionState::IncompleteExpired => "incomplete_expired",
            SubscriptionState::Trialing => "trialing",
            SubscriptionState::Active => "active",
            SubscriptionState::PastDue => "past_due",
            SubscriptionState::Canceled => "canceled",
            SubscriptionState::Unpaid => "unpaid",
            SubscriptionState::Paused => "paused",
            SubscriptionState::Unknown(raw) => raw,
        }
    }

    /// Statuses that grant premium access.
    pub fn grants_premium(&self) -> bool {
        matches!(self, SubscriptionState::Active | SubscriptionState::Trialing)
    }

    /// Statuses a user can still cancel.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            SubscriptionState::Active
                | SubscriptionState::Trialing
                | SubscriptionState::PastDue
                | SubscriptionState::Unpaid
        )
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a processor subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub subscription_id: SubscriptionId,
    pub status: SubscriptionState,
    pub current_period_end: Option<Timestamp>,
    /// Period end of the invoice that triggered this snapshot, if any.
    pub invoice_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub price_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl SubscriptionSnapshot {
    pub fn new(subscription_id: SubscriptionId, status: SubscriptionState) -> Self {
        Self {
            subscription_id,
            status,
            current_period_end: None,
            invoice_period_end: None,
            cancel_at_period_end: false,
            price_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_current_period_end(mut self, end: Option<Timestamp>) -> Self {
        self.current_period_end = end;
        self
    }

    pub fn with_invoice_period_end(mut self, end: Option<Timestamp>) -> Self {
        self.invoice_period_end = end;
        self
    }

    /// True when the subscription was created for the premium tier.
    pub fn is_premium(&self) -> bool {
        self.metadata.get("type").map(String::as_str) == Some("premium")
    }

    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get("userId").map(String::as_str)
    }
}

/// What to write to the user's premium fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumUpdate {
    Grant { until: Timestamp },
    Revoke,
}

/// Maps a snapshot to premium state.
///
/// Active or trialing grants premium until the invoice period end, else the
/// subscription period end, else `now + fallback_days`. Every other status
/// revokes.
pub fn apply_subscription_snapshot(
    snapshot: &SubscriptionSnapshot,
    now: Timestamp,
    fallback_days: i64,
) -> PremiumUpdate {
    if !snapshot.status.grants_premium() {
        return PremiumUpdate::Revoke;
    }

    let until = snapshot
        .invoice_period_end
        .or(snapshot.current_period_end)
        .unwrap_or_else(|| now.add_days(fallback_days));

    PremiumUpdate::Grant { until }
}
