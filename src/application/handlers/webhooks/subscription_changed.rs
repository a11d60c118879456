//! Handler for `customer.subscription.updated` and `customer.subscription.deleted`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::premium_invoice::{is_premium_subscription, resolve_account};
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{
    apply_subscription_snapshot, PremiumTerms, PremiumUpdate, SubscriptionState,
};
use crate::domain::webhook::{
    ProcessorEvent, ProcessorEventType, SubscriptionObject, WebhookError, WebhookEventHandler,
    WebhookOutcome,
};
use crate::ports::BillingAccountRepository;

/// Mirrors subscription lifecycle changes onto the user's premium fields.
///
/// Past-due and unpaid subscriptions keep premium until it runs out; the
/// expiry sweep resets them after the grace period.
pub struct SubscriptionChangedHandler {
    accounts: Arc<dyn BillingAccountRepository>,
    terms: Arc<PremiumTerms>,
}

impl SubscriptionChangedHandler {
    pub fn new(accounts: Arc<dyn BillingAccountRepository>, terms: Arc<PremiumTerms>) -> Self {
        Self { accounts, terms }
    }

    pub async fn handle_at(
        &self,
        event: &ProcessorEvent,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        let subscription: SubscriptionObject = event
            .deserialize_object()
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        let snapshot = subscription
            .to_snapshot()
            .ok_or(WebhookError::MissingField("id"))?;

        if !is_premium_subscription(&snapshot, &self.terms) {
            return Ok(WebhookOutcome::ignored("not a premium subscription"));
        }

        let deleted = event.parsed_type() == ProcessorEventType::SubscriptionDeleted;
        let update = if deleted {
            PremiumUpdate::Revoke
        } else {
            match snapshot.status {
                SubscriptionState::PastDue | SubscriptionState::Unpaid => {
                    return Ok(WebhookOutcome::ignored(format!(
                        "subscription {}; premium kept until expiry",
                        snapshot.status
                    )));
                }
                SubscriptionState::Incomplete => {
                    return Ok(WebhookOutcome::ignored("awaiting first payment"));
                }
                _ => apply_subscription_snapshot(&snapshot, now, self.terms.fallback_period_days),
            }
        };

        let account = resolve_account(
            self.accounts.as_ref(),
            snapshot.user_id(),
            subscription.customer.as_deref(),
        )
        .await?
        .ok_or_else(|| {
            WebhookError::NotFound(format!(
                "user for subscription {}",
                snapshot.subscription_id
            ))
        })?;

        let premium = account.premium.apply(update);
        if premium == account.premium {
            return Ok(WebhookOutcome::ignored("premium already up to date"));
        }
        if !self.accounts.set_premium(&account.user_id, &premium).await? {
            return Err(WebhookError::NotFound(format!("user {}", account.user_id)));
        }

        info!(
            user_id = %account.user_id,
            subscription_id = %snapshot.subscription_id,
            status = %snapshot.status,
            is_premium = premium.is_premium,
            "Premium updated from subscription change"
        );
        Ok(match update {
            PremiumUpdate::Grant { until } => {
                WebhookOutcome::applied(format!("premium granted until {}", until))
            }
            PremiumUpdate::Revoke => WebhookOutcome::applied("premium revoked"),
        })
    }
}

#[async_trait]
impl WebhookEventHandler for SubscriptionChangedHandler {
    fn handles(&self) -> Vec<ProcessorEventType> {
        vec![
            ProcessorEventType::SubscriptionUpdated,
            ProcessorEventType::SubscriptionDeleted,
        ]
    }

    async fn handle(&self, event: &ProcessorEvent) -> Result<WebhookOutcome, WebhookError> {
        self.handle_at(event, Timestamp::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingAccountRepository;
    use crate::domain::foundation::{CustomerId, UserId};
    use crate::domain::subscription::{BillingAccount, PremiumStatus};
    use crate::domain::webhook::ProcessorEventBuilder;
    use serde_json::json;

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    async fn setup(premium: PremiumStatus) -> (SubscriptionChangedHandler, Arc<InMemoryBillingAccountRepository>) {
        let accounts = Arc::new(InMemoryBillingAccountRepository::new());
        let mut account = BillingAccount::new(user());
        account.customer_id = Some(CustomerId::new("cus_1").unwrap());
        account.premium = premium;
        accounts.insert(account).await;
        let handler = SubscriptionChangedHandler::new(
            accounts.clone(),
            Arc::new(PremiumTerms::new("price_premium")),
        );
        (handler, accounts)
    }

    fn event(event_type: &str, status: &str, price: &str) -> ProcessorEvent {
        ProcessorEventBuilder::new()
            .event_type(event_type)
            .object(json!({
                "id": "sub_1",
                "object": "subscription",
                "customer": "cus_1",
                "status": status,
                "cancel_at_period_end": false,
                "items": { "data": [ {
                    "current_period_end": now().add_days(30).as_unix_secs(),
                    "price": { "id": price }
                } ] }
            }))
            .build()
    }

    #[tokio::test]
    async fn active_update_grants_until_period_end() {
        let (handler, accounts) = setup(PremiumStatus::free()).await;

        let outcome = handler
            .handle_at(&event("customer.subscription.updated", "active", "price_premium"), now())
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Applied(_)));
        assert_eq!(
            accounts.get(&user()).await.unwrap().premium,
            PremiumStatus::until(now().add_days(30))
        );
    }

    #[tokio::test]
    async fn deletion_revokes_premium() {
        let (handler, accounts) = setup(PremiumStatus::until(now().add_days(10))).await;

        handler
            .handle_at(&event("customer.subscription.deleted", "canceled", "price_premium"), now())
            .await
            .unwrap();

        assert_eq!(accounts.get(&user()).await.unwrap().premium, PremiumStatus::free());
    }

    #[tokio::test]
    async fn past_due_keeps_premium_for_grace() {
        let until = now().add_days(1);
        let (handler, accounts) = setup(PremiumStatus::until(until)).await;

        let outcome = handler
            .handle_at(&event("customer.subscription.updated", "past_due", "price_premium"), now())
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored(_)));
        assert_eq!(accounts.get(&user()).await.unwrap().premium, PremiumStatus::until(until));
    }

    #[tokio::test]
    async fn canceled_update_revokes_premium() {
        let (handler, accounts) = setup(PremiumStatus::until(now().add_days(10))).await;

        handler
            .handle_at(&event("customer.subscription.updated", "canceled", "price_premium"), now())
            .await
            .unwrap();

        assert!(!accounts.get(&user()).await.unwrap().premium.is_premium);
    }

    #[tokio::test]
    async fn other_subscriptions_are_ignored() {
        let (handler, accounts) = setup(PremiumStatus::free()).await;

        let outcome = handler
            .handle_at(&event("customer.subscription.updated", "active", "price_other"), now())
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored(_)));
        assert!(!accounts.get(&user()).await.unwrap().premium.is_premium);
    }

    #[tokio::test]
    async fn unknown_customer_is_not_found() {
        let accounts = Arc::new(InMemoryBillingAccountRepository::new());
        let handler =
            SubscriptionChangedHandler::new(accounts, Arc::new(PremiumTerms::new("price_premium")));

        let err = handler
            .handle_at(&event("customer.subscription.updated", "active", "price_premium"), now())
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::NotFound(_)));
    }

    #[tokio::test]
    async fn repeated_update_is_a_no_op() {
        let (handler, _) = setup(PremiumStatus::free()).await;
        let update = event("customer.subscription.updated", "active", "price_premium");

        handler.handle_at(&update, now()).await.unwrap();
        let again = handler.handle_at(&update, now()).await.unwrap();

        assert!(matches!(again, WebhookOutcome::Ignored(_)));
    }
}
