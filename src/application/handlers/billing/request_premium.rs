//! RequestPremiumHandler - Command handler for starting a premium subscription.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::billing::BillingError;
use crate::domain::foundation::{CustomerId, PaymentIntentId, SubscriptionId, Timestamp, UserId};
use crate::domain::ledger::{LedgerEntry, NewLedgerEntry, PaymentKind};
use crate::domain::subscription::{BillingAccount, PremiumTerms, SubscriptionState};
use crate::ports::{
    BillingAccountRepository, CreateCustomerRequest, CreateSubscriptionRequest, PaymentLedger,
    PaymentProcessor, Subscription,
};

/// Metadata keys written on premium subscriptions.
pub const META_TYPE: &str = "type";
pub const PREMIUM_TYPE: &str = "premium";
pub const META_SUBSCRIPTION_ID: &str = "subscriptionId";

/// How many subscriptions are inspected for an existing premium one.
const SUBSCRIPTION_SCAN_LIMIT: u32 = 10;

/// Window for the subscription idempotency key, in seconds.
const SUBSCRIPTION_KEY_WINDOW_SECS: i64 = 15 * 60;

/// Command to request premium for the calling user.
#[derive(Debug, Clone)]
pub struct RequestPremiumCommand {
    pub user_id: UserId,
}

/// Outcome of a premium request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPremiumResult {
    /// A new subscription awaits confirmation of its first invoice.
    Created {
        client_secret: Option<String>,
        subscription_id: SubscriptionId,
        status: SubscriptionState,
    },
    /// The user already has an active or trialing premium subscription.
    AlreadyPremium {
        subscription_id: SubscriptionId,
        status: SubscriptionState,
        current_period_end: Option<Timestamp>,
    },
}

/// Handler for premium subscription requests.
///
/// The processor customer is created at most once per user: the create call
/// carries a per-user idempotency key and the id is stored with a
/// conditional write that keeps whichever id landed first.
pub struct RequestPremiumHandler {
    accounts: Arc<dyn BillingAccountRepository>,
    ledger: Arc<dyn PaymentLedger>,
    processor: Arc<dyn PaymentProcessor>,
    terms: Arc<PremiumTerms>,
}

impl RequestPremiumHandler {
    pub fn new(
        accounts: Arc<dyn BillingAccountRepository>,
        ledger: Arc<dyn PaymentLedger>,
        processor: Arc<dyn PaymentProcessor>,
        terms: Arc<PremiumTerms>,
    ) -> Self {
        Self {
            accounts,
            ledger,
            processor,
            terms,
        }
    }

    pub async fn handle(
        &self,
        cmd: RequestPremiumCommand,
    ) -> Result<RequestPremiumResult, BillingError> {
        self.handle_at(cmd, Timestamp::now()).await
    }

    pub async fn handle_at(
        &self,
        cmd: RequestPremiumCommand,
        now: Timestamp,
    ) -> Result<RequestPremiumResult, BillingError> {
        // 1. Load the account
        let account = self
            .accounts
            .find_by_user_id(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::user_not_found(cmd.user_id.clone()))?;

        // 2. Ensure a processor customer
        let customer_id = self.ensure_customer(&account).await?;

        // 3. Return an existing premium subscription unchanged
        if let Some(existing) = self.find_live_subscription(&customer_id).await? {
            info!(
                user_id = %cmd.user_id,
                subscription_id = %existing.id,
                "User already has a premium subscription"
            );
            return Ok(RequestPremiumResult::AlreadyPremium {
                subscription_id: existing.id,
                status: existing.status,
                current_period_end: existing.current_period_end.and_then(Timestamp::from_unix_secs),
            });
        }

        // 4. Require a default payment method
        let payment_method = self.ensure_default_payment_method(&customer_id).await?;

        // 5. Create the subscription with an incomplete first invoice
        let mut metadata = BTreeMap::new();
        metadata.insert("userId".to_string(), cmd.user_id.to_string());
        metadata.insert(META_TYPE.to_string(), PREMIUM_TYPE.to_string());

        let subscription = self
            .processor
            .create_subscription(CreateSubscriptionRequest {
                customer_id: customer_id.clone(),
                price_id: self.terms.price_id.clone(),
                default_payment_method: Some(payment_method),
                metadata,
                idempotency_key: format!(
                    "sub-premium-{}-{}",
                    cmd.user_id,
                    now.as_unix_secs() / SUBSCRIPTION_KEY_WINDOW_SECS
                ),
            })
            .await?;

        // 6. Extract the payment handle of the first invoice
        let client_secret = self.invoice_client_secret(&subscription).await?;

        // 7. Record the pending charge
        self.record_pending(&cmd.user_id, &subscription, now).await?;

        info!(
            user_id = %cmd.user_id,
            subscription_id = %subscription.id,
            status = %subscription.status.as_str(),
            "Premium subscription created"
        );

        Ok(RequestPremiumResult::Created {
            client_secret,
            subscription_id: subscription.id,
            status: subscription.status,
        })
    }

    async fn ensure_customer(&self, account: &BillingAccount) -> Result<CustomerId, BillingError> {
        if let Some(id) = &account.customer_id {
            return Ok(id.clone());
        }

        let customer = self
            .processor
            .create_customer(CreateCustomerRequest {
                user_id: account.user_id.clone(),
                email: account.email.clone(),
                idempotency_key: format!("customer-{}", account.user_id),
            })
            .await?;

        let stored = self
            .accounts
            .assign_customer_id(&account.user_id, &customer.id)
            .await?;
        if stored != customer.id {
            warn!(
                user_id = %account.user_id,
                kept = %stored,
                discarded = %customer.id,
                "Concurrent customer creation; keeping the first stored id"
            );
        }
        Ok(stored)
    }

    async fn find_live_subscription(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<Subscription>, BillingError> {
        let subscriptions = self
            .processor
            .list_subscriptions(customer_id, SUBSCRIPTION_SCAN_LIMIT)
            .await?;
        Ok(subscriptions.into_iter().find(|s| {
            s.status.grants_premium()
                && (s.price_id.as_deref() == Some(self.terms.price_id.as_str())
                    || s.metadata.get(META_TYPE).map(String::as_str) == Some(PREMIUM_TYPE))
        }))
    }

    /// The customer's invoice default, promoting the first card on file if
    /// no default is set.
    async fn ensure_default_payment_method(
        &self,
        customer_id: &CustomerId,
    ) -> Result<String, BillingError> {
        let customer = self
            .processor
            .retrieve_customer(customer_id)
            .await?
            .ok_or_else(|| {
                BillingError::upstream(format!("customer {} not found at processor", customer_id))
            })?;

        if let Some(method) = customer.default_payment_method {
            return Ok(method);
        }

        let methods = self.processor.list_payment_methods(customer_id).await?;
        let first = methods
            .into_iter()
            .next()
            .ok_or(BillingError::PaymentMethodRequired)?;

        let updated = self
            .processor
            .set_default_payment_method(customer_id, &first.id)
            .await?;
        updated
            .default_payment_method
            .ok_or(BillingError::PaymentMethodRequired)
    }

    async fn invoice_client_secret(
        &self,
        subscription: &Subscription,
    ) -> Result<Option<String>, BillingError> {
        let Some(invoice) = &subscription.latest_invoice else {
            return Ok(None);
        };
        if invoice.client_secret.is_some() {
            return Ok(invoice.client_secret.clone());
        }
        match &invoice.payment_intent_id {
            Some(id) => Ok(self
                .processor
                .retrieve_payment_intent(id)
                .await?
                .and_then(|pi| pi.client_secret)),
            None => Ok(None),
        }
    }

    async fn record_pending(
        &self,
        user_id: &UserId,
        subscription: &Subscription,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        let Some(invoice) = &subscription.latest_invoice else {
            return Ok(());
        };
        // Keyed by the invoice's intent, or the subscription when there is none
        let key = match &invoice.payment_intent_id {
            Some(id) => id.clone(),
            None => PaymentIntentId::new(subscription.id.as_str())?,
        };
        let mut metadata = BTreeMap::new();
        metadata.insert(META_SUBSCRIPTION_ID.to_string(), subscription.id.to_string());
        metadata.insert("invoiceId".to_string(), invoice.id.clone());

        let entry = LedgerEntry::pending(
            NewLedgerEntry {
                payment_intent_id: key,
                user_id: user_id.clone(),
                listing_id: None,
                amount: invoice.amount_due,
                currency: invoice.currency.clone(),
                kind: PaymentKind::PremiumSubscription,
                metadata,
            },
            now,
        );
        self.ledger.insert_if_absent(&entry).await?;
        Ok(())
    }
}
