//! Billing account: the part of a user record that billing owns.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::snapshot::PremiumUpdate;
use crate::domain::foundation::{CustomerId, Timestamp, UserId};

/// Persisted premium fields of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PremiumStatus {
    pub is_premium: bool,
    pub premium_until: Option<Timestamp>,
}

impl PremiumStatus {
    pub fn free() -> Self {
        Self::default()
    }

    pub fn until(until: Timestamp) -> Self {
        Self {
            is_premium: true,
            premium_until: Some(until),
        }
    }

    /// Derived read. Premium stays readable for `grace` after its end date,
    /// matching the window the sweeper waits before resetting it.
    pub fn is_active_at(&self, now: Timestamp, grace: Duration) -> bool {
        self.is_premium
            && self
                .premium_until
                .is_some_and(|until| until.is_after(&now.minus(grace)))
    }

    /// Stored fields after applying an update.
    pub fn apply(self, update: PremiumUpdate) -> Self {
        match update {
            PremiumUpdate::Grant { until } => Self::until(until),
            PremiumUpdate::Revoke => Self::free(),
        }
    }
}

/// A user as seen by billing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAccount {
    pub user_id: UserId,
    pub email: Option<String>,
    /// Assigned once, never recreated.
    pub customer_id: Option<CustomerId>,
    pub premium: PremiumStatus,
}

impl BillingAccount {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
            customer_id: None,
            premium: PremiumStatus::free(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
