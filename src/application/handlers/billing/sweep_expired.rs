//! SweepExpiredHandler - Periodic reset of lapsed promotions and premium.
//!
//! Reads already treat expired state as inactive; the sweep only brings the
//! stored flags in line. Each step runs independently so one failing store
//! does not block the others.

use chrono::Duration;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::PremiumTerms;
use crate::ports::{BillingAccountRepository, ListingRepository, WebhookEventRepository};

/// Days processed webhook records are kept.
pub const DEFAULT_WEBHOOK_RETENTION_DAYS: i64 = 30;

/// Counts from one sweep. `None` means the step failed and was logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub promotions_expired: Option<u64>,
    pub premium_expired: Option<u64>,
    pub webhook_records_deleted: Option<u64>,
}

impl SweepReport {
    pub fn is_complete(&self) -> bool {
        self.promotions_expired.is_some()
            && self.premium_expired.is_some()
            && self.webhook_records_deleted.is_some()
    }
}

pub struct SweepExpiredHandler {
    listings: Arc<dyn ListingRepository>,
    accounts: Arc<dyn BillingAccountRepository>,
    webhook_events: Arc<dyn WebhookEventRepository>,
    grace_period: Duration,
    webhook_retention: Duration,
}

impl SweepExpiredHandler {
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        accounts: Arc<dyn BillingAccountRepository>,
        webhook_events: Arc<dyn WebhookEventRepository>,
        terms: &PremiumTerms,
    ) -> Self {
        Self {
            listings,
            accounts,
            webhook_events,
            grace_period: terms.grace_period,
            webhook_retention: Duration::days(DEFAULT_WEBHOOK_RETENTION_DAYS),
        }
    }

    pub fn with_webhook_retention(mut self, retention: Duration) -> Self {
        self.webhook_retention = retention;
        self
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Timestamp::now()).await
    }

    pub async fn sweep_at(&self, now: Timestamp) -> SweepReport {
        let promotions_expired = match self.listings.expire_promotions(now).await {
            Ok(count) => Some(count),
            Err(e) => {
                error!(error = %e, "Failed to expire listing promotions");
                None
            }
        };

        let premium_cutoff = now.minus(self.grace_period);
        let premium_expired = match self.accounts.expire_premium(premium_cutoff).await {
            Ok(count) => Some(count),
            Err(e) => {
                error!(error = %e, "Failed to expire premium accounts");
                None
            }
        };

        let retention_cutoff = now.minus(self.webhook_retention);
        let webhook_records_deleted = match self.webhook_events.delete_before(retention_cutoff).await
        {
            Ok(count) => Some(count),
            Err(e) => {
                error!(error = %e, "Failed to prune webhook records");
                None
            }
        };

        let report = SweepReport {
            promotions_expired,
            premium_expired,
            webhook_records_deleted,
        };
        info!(
            promotions_expired = ?report.promotions_expired,
            premium_expired = ?report.premium_expired,
            webhook_records_deleted = ?report.webhook_records_deleted,
            "Expiry sweep finished"
        );
        report
    }
}
