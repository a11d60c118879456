//! SyncPremiumHandler - Reconciles stored premium with the processor.
//!
//! Used when a webhook may have been missed: the latest subscription is
//! fetched and run through the same snapshot rule the reconciler uses.

use std::sync::Arc;
use tracing::info;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{
    apply_subscription_snapshot, PremiumStatus, PremiumTerms, PremiumUpdate, SubscriptionState,
};
use crate::ports::{BillingAccountRepository, PaymentProcessor};

#[derive(Debug, Clone)]
pub struct SyncPremiumCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPremiumResult {
    pub premium: PremiumStatus,
    pub subscription_id: Option<SubscriptionId>,
    pub status: Option<SubscriptionState>,
}

pub struct SyncPremiumHandler {
    accounts: Arc<dyn BillingAccountRepository>,
    processor: Arc<dyn PaymentProcessor>,
    terms: Arc<PremiumTerms>,
}

impl SyncPremiumHandler {
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

    pub async fn handle(&self, cmd: SyncPremiumCommand) -> Result<SyncPremiumResult, BillingError> {
        self.handle_at(cmd, Timestamp::now()).await
    }

    pub async fn handle_at(
        &self,
        cmd: SyncPremiumCommand,
        now: Timestamp,
    ) -> Result<SyncPremiumResult, BillingError> {
        let account = self
            .accounts
            .find_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::user_not_found(cmd.user_id.clone()))?;

        let latest = match &account.customer_id {
            Some(customer_id) => self
                .processor
                .list_subscriptions(customer_id, 1)
                .await?
                .into_iter()
                .next(),
            None => None,
        };

        let update = match &latest {
            Some(subscription) => apply_subscription_snapshot(
                &subscription.to_snapshot(None),
                now,
                self.terms.fallback_period_days,
            ),
            None => PremiumUpdate::Revoke,
        };

        let premium = account.premium.apply(update);
        if premium != account.premium {
            self.accounts.set_premium(&cmd.user_id, &premium).await?;
            info!(
                user_id = %cmd.user_id,
                is_premium = premium.is_premium,
                "Premium status synchronized"
            );
        }

        Ok(SyncPremiumResult {
            premium,
            subscription_id: latest.as_ref().map(|s| s.id.clone()),
            status: latest.map(|s| s.status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingAccountRepository;
    use crate::adapters::stripe::MockPaymentProcessor;
    use crate::domain::foundation::CustomerId;
    use crate::domain::subscription::BillingAccount;
    use crate::ports::{LatestInvoice, Subscription};
    use std::collections::BTreeMap;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    fn customer() -> CustomerId {
        CustomerId::new("cus_1").unwrap()
    }

    async fn setup(
        account: BillingAccount,
    ) -> (
        SyncPremiumHandler,
        Arc<InMemoryBillingAccountRepository>,
        MockPaymentProcessor,
    ) {
        let accounts = Arc::new(InMemoryBillingAccountRepository::new());
        accounts.insert(account).await;
        let processor = MockPaymentProcessor::new();
        let handler = SyncPremiumHandler::new(
            accounts.clone(),
            Arc::new(processor.clone()),
            Arc::new(PremiumTerms::new("price_premium")),
        );
        (handler, accounts, processor)
    }

    fn linked_account(premium: PremiumStatus) -> BillingAccount {
        let mut account = BillingAccount::new(user());
        account.customer_id = Some(customer());
        account.premium = premium;
        account
    }

    fn subscription(status: SubscriptionState, invoice_end: Option<i64>) -> Subscription {
        Subscription {
            id: SubscriptionId::new("sub_1").unwrap(),
            customer_id: customer(),
            status,
            price_id: Some("price_premium".to_string()),
            current_period_end: Some(now().add_days(28).as_unix_secs()),
            cancel_at_period_end: false,
            metadata: BTreeMap::new(),
            latest_invoice: Some(LatestInvoice {
                id: "in_1".to_string(),
                amount_due: 9900,
                currency: "mxn".to_string(),
                period_end: invoice_end,
                payment_intent_id: None,
                client_secret: None,
            }),
        }
    }

    fn command() -> SyncPremiumCommand {
        SyncPremiumCommand { user_id: user() }
    }

    #[tokio::test]
    async fn active_subscription_grants_until_invoice_period_end() {
        let (handler, accounts, processor) = setup(linked_account(PremiumStatus::free())).await;
        let invoice_end = now().add_days(31);
        processor.add_subscription(subscription(
            SubscriptionState::Active,
            Some(invoice_end.as_unix_secs()),
        ));

        let result = handler.handle_at(command(), now()).await.unwrap();

        assert_eq!(result.premium, PremiumStatus::until(invoice_end));
        assert_eq!(result.status, Some(SubscriptionState::Active));
        assert_eq!(accounts.get(&user()).await.unwrap().premium, PremiumStatus::until(invoice_end));
    }

    #[tokio::test]
    async fn canceled_subscription_revokes() {
        let (handler, accounts, processor) =
            setup(linked_account(PremiumStatus::until(now().add_days(5)))).await;
        processor.add_subscription(subscription(SubscriptionState::Canceled, None));

        let result = handler.handle_at(command(), now()).await.unwrap();

        assert_eq!(result.premium, PremiumStatus::free());
        assert!(!accounts.get(&user()).await.unwrap().premium.is_premium);
    }

    #[tokio::test]
    async fn no_subscription_revokes() {
        let (handler, accounts, _) =
            setup(linked_account(PremiumStatus::until(now().add_days(5)))).await;

        let result = handler.handle_at(command(), now()).await.unwrap();

        assert!(result.subscription_id.is_none());
        assert_eq!(accounts.get(&user()).await.unwrap().premium, PremiumStatus::free());
    }

    #[tokio::test]
    async fn user_without_customer_is_revoked_without_processor_calls() {
        let mut account = BillingAccount::new(user());
        account.premium = PremiumStatus::until(now().add_days(5));
        let (handler, accounts, processor) = setup(account).await;

        handler.handle_at(command(), now()).await.unwrap();

        assert!(processor.calls().is_empty());
        assert!(!accounts.get(&user()).await.unwrap().premium.is_premium);
    }
}
