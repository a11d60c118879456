//! GetPremiumStatusHandler - Query handler for a user's premium state.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{CustomerId, SubscriptionId, Timestamp, UserId};
use crate::domain::subscription::{PremiumTerms, SubscriptionState};
use crate::ports::{BillingAccountRepository, Invoice, PaymentProcessor};

/// Number of invoices returned with the status.
pub const INVOICE_HISTORY_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct GetPremiumStatusQuery {
    pub user_id: UserId,
}

/// The user's most recent subscription as the processor reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionView {
    pub id: SubscriptionId,
    pub status: SubscriptionState,
    pub price_id: Option<String>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetPremiumStatusResult {
    /// Derived from `premium_until` and the grace period.
    pub is_premium: bool,
    pub premium_until: Option<Timestamp>,
    pub customer_id: Option<CustomerId>,
    pub subscription: Option<SubscriptionView>,
    pub invoices: Vec<Invoice>,
}

pub struct GetPremiumStatusHandler {
    accounts: Arc<dyn BillingAccountRepository>,
    processor: Arc<dyn PaymentProcessor>,
    terms: Arc<PremiumTerms>,
}

impl GetPremiumStatusHandler {
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
        query: GetPremiumStatusQuery,
    ) -> Result<GetPremiumStatusResult, BillingError> {
        self.handle_at(query, Timestamp::now()).await
    }

    pub async fn handle_at(
        &self,
        query: GetPremiumStatusQuery,
        now: Timestamp,
    ) -> Result<GetPremiumStatusResult, BillingError> {
        let account = self
            .accounts
            .find_by_user_id(&query.user_id)
            .await?
            .ok_or_else(|| BillingError::user_not_found(query.user_id.clone()))?;

        let is_premium = account.premium.is_active_at(now, self.terms.grace_period);
        let premium_until = account.premium.premium_until;

        // Users who never started checkout have nothing at the processor
        let Some(customer_id) = account.customer_id else {
            return Ok(GetPremiumStatusResult {
                is_premium,
                premium_until,
                customer_id: None,
                subscription: None,
                invoices: Vec::new(),
            });
        };

        let (subscriptions, invoices) = futures::try_join!(
            self.processor.list_subscriptions(&customer_id, 1),
            self.processor
                .list_invoices(&customer_id, INVOICE_HISTORY_LIMIT),
        )?;

        let subscription = subscriptions
            .into_iter()
            .next()
            .map(|s| SubscriptionView {
                id: s.id,
                status: s.status,
                price_id: s.price_id,
                current_period_end: s.current_period_end.and_then(Timestamp::from_unix_secs),
                cancel_at_period_end: s.cancel_at_period_end,
            });

        Ok(GetPremiumStatusResult {
            is_premium,
            premium_until,
            customer_id: Some(customer_id),
            subscription,
            invoices,
        })
    }
}
