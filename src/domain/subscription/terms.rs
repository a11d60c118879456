//! Premium plan terms shared by the premium operations and the reconciler.

use chrono::Duration;

use super::snapshot::DEFAULT_FALLBACK_PERIOD_DAYS;

/// Days a lapsed premium stays readable before the sweeper resets it.
pub const DEFAULT_GRACE_PERIOD_DAYS: i64 = 3;

/// Read-only premium configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PremiumTerms {
    /// Processor price id of the premium plan.
    pub price_id: String,
    pub grace_period: Duration,
    /// Used when a subscription carries no period end at all.
    pub fallback_period_days: i64,
}

impl PremiumTerms {
    pub fn new(price_id: impl Into<String>) -> Self {
        Self {
            price_id: price_id.into(),
            grace_period: Duration::days(DEFAULT_GRACE_PERIOD_DAYS),
            fallback_period_days: DEFAULT_FALLBACK_PERIOD_DAYS,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_fallback_period_days(mut self, days: i64) -> Self {
        self.fallback_period_days = days;
        self
    }
}
