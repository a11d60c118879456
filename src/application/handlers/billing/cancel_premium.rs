//! CancelPremiumHandler - Command handler for cancelling premium.
//!
//! Cancelling at period end flags the subscription to end with the paid period,
//! so premium stays until the processor reports the deletion. Immediate
//! cancellation applies the resulting snapshot right away.

use std::sync::Arc;
use tracing::info;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{
    apply_subscription_snapshot, PremiumStatus, PremiumTerms, SubscriptionState,
};
use crate::ports::{BillingAccountRepository, PaymentProcessor};

const SUBSCRIPTION_SCAN_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct CancelPremiumCommand {
    pub user_id: UserId,
    /// Keep access until the paid period ends; `false` cancels now.
    pub at_period_end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelPremiumResult {
    pub subscription_id: SubscriptionId,
    pub status: SubscriptionState,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<Timestamp>,
    pub premium: PremiumStatus,
}

pub struct CancelPremiumHandler {
    accounts: Arc<dyn BillingAccountRepository>,
    processor: Arc<dyn PaymentProcessor>,
    terms: Arc<PremiumTerms>,
}

impl CancelPremiumHandler {
    pub fn new(
        accounts: Arc<dyn BillingAccountRepository>,
        processor: Arc<dyn PaymentProcessor>,
        terms: Arc<PremiumTerms>,
    ) -> Self {
        Self {
            accounts,
            processor,
            terms,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelPremiumCommand,
    ) -> Result<CancelPremiumResult, BillingError> {
        self.handle_at(cmd, Timestamp::now()).await
    }

    pub async fn handle_at(
        &self,
        cmd: CancelPremiumCommand,
        now: Timestamp,
    ) -> Result<CancelPremiumResult, BillingError> {
        // 1. Load the account
        let account = self
            .accounts
            .find_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::user_not_found(cmd.user_id.clone()))?;

        let customer_id = account
            .customer_id
            .as_ref()
            .ok_or_else(|| BillingError::NoActiveSubscription(cmd.user_id.clone()))?;

        // 2. Find a subscription that can still be cancelled
        let subscription = self
            .processor
            .list_subscriptions(customer_id, SUBSCRIPTION_SCAN_LIMIT)
            .await?
            .into_iter()
            .find(|s| s.status.is_cancellable())
            .ok_or_else(|| BillingError::NoActiveSubscription(cmd.user_id.clone()))?;

        // 3. Cancel at the processor
        let cancelled = self
            .processor
            .cancel_subscription(&subscription.id, cmd.at_period_end)
            .await?;

        // 4. Immediate cancellation revokes now; the rest waits for the webhook
        let mut premium = account.premium;
        if !cmd.at_period_end {
            let update = apply_subscription_snapshot(
                &cancelled.to_snapshot(None),
                now,
                self.terms.fallback_period_days,
            );
            premium = premium.apply(update);
            self.accounts.set_premium(&cmd.user_id, &premium).await?;
        }

        info!(
            user_id = %cmd.user_id,
            subscription_id = %cancelled.id,
            at_period_end = cmd.at_period_end,
            "Premium subscription cancelled"
        );

        Ok(CancelPremiumResult {
            current_period_end: cancelled.current_period_end.and_then(Timestamp::from_unix_secs),
            subscription_id: cancelled.id,
            status: cancelled.status,
            cancel_at_period_end: cancelled.cancel_at_period_end,
            premium,
        })
    }
}
