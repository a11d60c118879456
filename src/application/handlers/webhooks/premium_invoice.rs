//! Webhook handlers for premium subscription invoices.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use super::compensation::{is_compensated, CompensationTarget, RefundCompensator};
use crate::application::handlers::billing::{META_SUBSCRIPTION_ID, META_USER_ID};
use crate::domain::foundation::{CustomerId, PaymentIntentId, SubscriptionId, Timestamp, UserId};
use crate::domain::ledger::{LedgerEntry, LedgerStatus, NewLedgerEntry, PaymentKind};
use crate::domain::subscription::{
    apply_subscription_snapshot, BillingAccount, PremiumTerms, PremiumUpdate, SubscriptionSnapshot,
};
use crate::domain::webhook::{
    InvoiceObject, ProcessorEvent, ProcessorEventType, WebhookError, WebhookEventHandler,
    WebhookOutcome,
};
use crate::ports::{BillingAccountRepository, PaymentLedger, PaymentProcessor};

/// Finds the account a premium event belongs to: the `userId` metadata
/// first, then the processor customer id.
pub(super) async fn resolve_account(
    accounts: &dyn BillingAccountRepository,
    user_id: Option<&str>,
    customer_id: Option<&str>,
) -> Result<Option<BillingAccount>, WebhookError> {
    if let Some(user_id) = user_id.and_then(|raw| UserId::new(raw).ok()) {
        if let Some(account) = accounts.find_by_user_id(&user_id).await? {
            return Ok(Some(account));
        }
    }
    match customer_id.and_then(|raw| CustomerId::new(raw).ok()) {
        Some(customer_id) => Ok(accounts.find_by_customer_id(&customer_id).await?),
        None => Ok(None),
    }
}

/// A subscription counts as premium if it was tagged so or bills the premium price.
pub(super) fn is_premium_subscription(snapshot: &SubscriptionSnapshot, terms: &PremiumTerms) -> bool {
    snapshot.is_premium() || snapshot.price_id.as_deref() == Some(terms.price_id.as_str())
}

/// Ledger key of an invoice charge: its payment intent, else the invoice id.
fn invoice_payment_key(invoice: &InvoiceObject) -> Result<PaymentIntentId, WebhookError> {
    let raw = invoice
        .payment_intent
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| invoice.id.clone());
    PaymentIntentId::new(raw).map_err(|_| WebhookError::MissingField("id"))
}

fn parse_invoice(event: &ProcessorEvent) -> Result<InvoiceObject, WebhookError> {
    event
        .deserialize_object()
        .map_err(|e| WebhookError::ParseError(e.to_string()))
}

fn invoice_metadata(invoice: &InvoiceObject, subscription_id: Option<&str>) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("invoiceId".to_string(), invoice.id.clone());
    if let Some(id) = subscription_id {
        metadata.insert(META_SUBSCRIPTION_ID.to_string(), id.to_string());
    }
    metadata
}

// ════════════════════════════════════════════════════════════════════════════════
// invoice.paid / invoice.payment_succeeded
// ════════════════════════════════════════════════════════════════════════════════

/// Grants premium for a paid subscription invoice.
///
/// The subscription is re-read from the processor so the decision uses its
/// current status, and premium runs until the invoice's period end.
pub struct InvoicePaidHandler {
    accounts: Arc<dyn BillingAccountRepository>,
    ledger: Arc<dyn PaymentLedger>,
    processor: Arc<dyn PaymentProcessor>,
    terms: Arc<PremiumTerms>,
    compensator: Arc<RefundCompensator>,
}

impl InvoicePaidHandler {
    pub fn new(
        accounts: Arc<dyn BillingAccountRepository>,
        ledger: Arc<dyn PaymentLedger>,
        processor: Arc<dyn PaymentProcessor>,
        terms: Arc<PremiumTerms>,
        compensator: Arc<RefundCompensator>,
    ) -> Self {
        Self {
            accounts,
            ledger,
            processor,
            terms,
            compensator,
        }
    }

    pub async fn handle_at(
        &self,
        event: &ProcessorEvent,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        // 1. Locate the subscription
        let invoice = parse_invoice(event)?;
        let Some(raw_subscription) = invoice.subscription_id() else {
            return Ok(WebhookOutcome::ignored("invoice without subscription"));
        };
        let subscription_id = SubscriptionId::new(raw_subscription)
            .map_err(|_| WebhookError::MissingField("subscription"))?;
        let Some(subscription) = self
            .processor
            .retrieve_subscription(&subscription_id)
            .await?
        else {
            return Ok(WebhookOutcome::ignored("subscription not found at processor"));
        };

        // 2. Only active premium subscriptions grant anything
        let snapshot = subscription.to_snapshot(invoice.line_period_end());
        if !is_premium_subscription(&snapshot, &self.terms) {
            return Ok(WebhookOutcome::ignored("not a premium subscription"));
        }
        if !snapshot.status.grants_premium() {
            return Ok(WebhookOutcome::ignored(format!(
                "subscription status {} does not grant premium",
                snapshot.status
            )));
        }

        // 3. Resolve the user
        let customer = invoice
            .customer
            .clone()
            .unwrap_or_else(|| subscription.customer_id.to_string());
        let account = resolve_account(self.accounts.as_ref(), snapshot.user_id(), Some(customer.as_str()))
            .await?
            .ok_or_else(|| WebhookError::NotFound(format!("user for customer {}", customer)))?;

        // 4. Skip payments that were already refunded
        let payment_key = invoice_payment_key(&invoice)?;
        let entry = self.ledger.find_by_payment_intent(&payment_key).await?;
        if entry.as_ref().is_some_and(is_compensated) {
            return Ok(WebhookOutcome::failed("payment already refunded"));
        }

        // 5. Grant premium; refund if it cannot be stored
        let update = apply_subscription_snapshot(&snapshot, now, self.terms.fallback_period_days);
        let premium = account.premium.apply(update);
        let stored = match self.accounts.set_premium(&account.user_id, &premium).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("user {} not found", account.user_id)),
            Err(e) => Err(e.to_string()),
        };
        if let Err(cause) = stored {
            return self
                .compensate(&invoice, &account, entry, &cause, now)
                .await;
        }

        // 6. Settle the ledger
        self.record_success(entry, &invoice, payment_key, &account, raw_subscription, now)
            .await?;

        let until = match update {
            PremiumUpdate::Grant { until } => until,
            PremiumUpdate::Revoke => now,
        };
        info!(
            user_id = %account.user_id,
            subscription_id = %subscription_id,
            premium_until = %until,
            "Premium granted from paid invoice"
        );
        Ok(WebhookOutcome::applied(format!(
            "premium granted until {}",
            until
        )))
    }

    async fn compensate(
        &self,
        invoice: &InvoiceObject,
        account: &BillingAccount,
        entry: Option<LedgerEntry>,
        cause: &str,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        let Some(payment_intent) = invoice.payment_intent.as_deref().filter(|id| !id.is_empty())
        else {
            error!(
                critical = true,
                invoice_id = %invoice.id,
                user_id = %account.user_id,
                cause = cause,
                "Premium could not be stored and the invoice has no payment intent to refund"
            );
            return Err(WebhookError::Database(cause.to_string()));
        };
        let target = CompensationTarget {
            payment_intent_id: PaymentIntentId::new(payment_intent)
                .map_err(|_| WebhookError::MissingField("payment_intent"))?,
            user_id: Some(account.user_id.clone()),
            amount: invoice.amount_paid,
            currency: invoice.currency.clone().unwrap_or_default(),
            kind: PaymentKind::PremiumSubscription,
            entry,
        };
        Ok(self.compensator.compensate(target, cause, now).await)
    }

    async fn record_success(
        &self,
        entry: Option<LedgerEntry>,
        invoice: &InvoiceObject,
        payment_key: PaymentIntentId,
        account: &BillingAccount,
        subscription_id: &str,
        now: Timestamp,
    ) -> Result<(), WebhookError> {
        match entry {
            Some(mut entry) if entry.status == LedgerStatus::Pending => {
                entry.settle(LedgerStatus::Succeeded, None, now)?;
                self.ledger.update_status(&entry).await?;
            }
            Some(_) => {}
            None => {
                let entry = LedgerEntry::settled(
                    NewLedgerEntry {
                        payment_intent_id: payment_key,
                        user_id: account.user_id.clone(),
                        listing_id: None,
                        amount: invoice.amount_paid,
                        currency: invoice.currency.clone().unwrap_or_default(),
                        kind: PaymentKind::PremiumSubscription,
                        metadata: invoice_metadata(invoice, Some(subscription_id)),
                    },
                    LedgerStatus::Succeeded,
                    None,
                    now,
                );
                self.ledger.insert_if_absent(&entry).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookEventHandler for InvoicePaidHandler {
    fn handles(&self) -> Vec<ProcessorEventType> {
        vec![
            ProcessorEventType::InvoicePaid,
            ProcessorEventType::InvoicePaymentSucceeded,
        ]
    }

    async fn handle(&self, event: &ProcessorEvent) -> Result<WebhookOutcome, WebhookError> {
        self.handle_at(event, Timestamp::now()).await
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// invoice.payment_failed
// ════════════════════════════════════════════════════════════════════════════════

/// Records a failed invoice charge. Existing premium is left to run out.
pub struct InvoicePaymentFailedHandler {
    accounts: Arc<dyn BillingAccountRepository>,
    ledger: Arc<dyn PaymentLedger>,
}

impl InvoicePaymentFailedHandler {
    pub fn new(accounts: Arc<dyn BillingAccountRepository>, ledger: Arc<dyn PaymentLedger>) -> Self {
        Self { accounts, ledger }
    }

    pub async fn handle_at(
        &self,
        event: &ProcessorEvent,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        let invoice = parse_invoice(event)?;
        let metadata_user = invoice
            .parent
            .as_ref()
            .and_then(|p| p.subscription_details.as_ref())
            .and_then(|d| d.metadata.get(META_USER_ID))
            .map(String::as_str);

        let Some(account) =
            resolve_account(self.accounts.as_ref(), metadata_user, invoice.customer.as_deref())
                .await?
        else {
            return Ok(WebhookOutcome::ignored("customer not linked to a user"));
        };

        let message = "invoice payment failed".to_string();
        let payment_key = invoice_payment_key(&invoice)?;
        match self.ledger.find_by_payment_intent(&payment_key).await? {
            Some(mut entry) => {
                if entry.status != LedgerStatus::Pending {
                    return Ok(WebhookOutcome::ignored(format!(
                        "ledger entry already {}",
                        entry.status
                    )));
                }
                entry.settle(LedgerStatus::Failed, Some(message), now)?;
                self.ledger.update_status(&entry).await?;
            }
            None => {
                let entry = LedgerEntry::settled(
                    NewLedgerEntry {
                        payment_intent_id: payment_key,
                        user_id: account.user_id.clone(),
                        listing_id: None,
                        amount: invoice.amount_due,
                        currency: invoice.currency.clone().unwrap_or_default(),
                        kind: PaymentKind::PremiumSubscription,
                        metadata: invoice_metadata(&invoice, invoice.subscription_id()),
                    },
                    LedgerStatus::Failed,
                    Some(message),
                    now,
                );
                self.ledger.insert_if_absent(&entry).await?;
            }
        }

        info!(
            user_id = %account.user_id,
            invoice_id = %invoice.id,
            "Invoice payment failure recorded; premium unchanged"
        );
        Ok(WebhookOutcome::applied("invoice payment failure recorded"))
    }
}

#[async_trait]
impl WebhookEventHandler for InvoicePaymentFailedHandler {
    fn handles(&self) -> Vec<ProcessorEventType> {
        vec![ProcessorEventType::InvoicePaymentFailed]
    }

    async fn handle(&self, event: &ProcessorEvent) -> Result<WebhookOutcome, WebhookError> {
        self.handle_at(event, Timestamp::now()).await
    }
}
