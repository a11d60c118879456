//! Refund compensation for payments whose local activation failed.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, warn};

use crate::domain::foundation::{DomainError, PaymentIntentId, Timestamp, UserId};
use crate::domain::ledger::{LedgerEntry, LedgerStatus, NewLedgerEntry, PaymentKind};
use crate::domain::webhook::WebhookOutcome;
use crate::ports::{CreateRefundRequest, PaymentLedger, PaymentProcessor};

/// Refund reason, also the prefix of the ledger error message.
pub const COMPENSATION_REASON: &str = "failed_service_activation";

/// Ledger error prefix when the refund itself could not be issued.
pub const REFUND_FAILED_PREFIX: &str = "refund_failed";

/// True once a refund was issued for this entry.
pub fn is_compensated(entry: &LedgerEntry) -> bool {
    entry.status == LedgerStatus::Failed
        && entry
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with(COMPENSATION_REASON))
}

/// What the compensator needs to know about the payment it reverses.
#[derive(Debug, Clone)]
pub struct CompensationTarget {
    pub payment_intent_id: PaymentIntentId,
    /// Payer, when known; without it and without an entry nothing is recorded.
    pub user_id: Option<UserId>,
    pub amount: i64,
    pub currency: String,
    pub kind: PaymentKind,
    /// Ledger entry for the payment, if one was recorded.
    pub entry: Option<LedgerEntry>,
}

/// Issues a refund and records it on the ledger.
///
/// The refund carries the idempotency key `refund-{payment_intent}`, so a
/// second attempt for the same payment returns the first refund.
pub struct RefundCompensator {
    processor: Arc<dyn PaymentProcessor>,
    ledger: Arc<dyn PaymentLedger>,
}

impl RefundCompensator {
    pub fn new(processor: Arc<dyn PaymentProcessor>, ledger: Arc<dyn PaymentLedger>) -> Self {
        Self { processor, ledger }
    }

    /// Refunds the payment after `cause` prevented activation.
    ///
    /// Always returns a `failed` outcome; a refund that could not be issued
    /// is logged as critical for operator follow-up.
    pub async fn compensate(
        &self,
        target: CompensationTarget,
        cause: &str,
        now: Timestamp,
    ) -> WebhookOutcome {
        let refund = self
            .processor
            .create_refund(CreateRefundRequest {
                payment_intent_id: target.payment_intent_id.clone(),
                reason: COMPENSATION_REASON.to_string(),
                idempotency_key: format!("refund-{}", target.payment_intent_id),
            })
            .await;

        let (message, outcome) = match refund {
            Ok(refund) => {
                warn!(
                    payment_intent_id = %target.payment_intent_id,
                    refund_id = %refund.id,
                    cause = cause,
                    "Payment refunded after failed activation"
                );
                (
                    format!("{}: {}", COMPENSATION_REASON, cause),
                    WebhookOutcome::failed(format!("activation failed, refunded: {}", cause)),
                )
            }
            Err(refund_err) => {
                error!(
                    critical = true,
                    payment_intent_id = %target.payment_intent_id,
                    user_id = ?target.user_id,
                    amount = target.amount,
                    cause = cause,
                    error = %refund_err,
                    "Refund failed after failed activation; manual intervention required"
                );
                (
                    format!("{}: {}; activation: {}", REFUND_FAILED_PREFIX, refund_err, cause),
                    WebhookOutcome::failed(format!(
                        "activation failed and refund failed: {}",
                        refund_err
                    )),
                )
            }
        };

        if let Err(e) = self.record(target, message, now).await {
            error!(error = %e, "Failed to record compensation on the ledger");
        }
        outcome
    }

    async fn record(
        &self,
        target: CompensationTarget,
        message: String,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        match target.entry {
            Some(mut entry) => {
                if entry.status == LedgerStatus::Pending {
                    entry.settle(LedgerStatus::Failed, Some(message), now)?;
                    self.ledger.update_status(&entry).await?;
                }
                Ok(())
            }
            None => {
                let Some(user_id) = target.user_id else {
                    warn!(
                        payment_intent_id = %target.payment_intent_id,
                        "Compensated payment has no payer; not recorded on the ledger"
                    );
                    return Ok(());
                };
                let entry = LedgerEntry::settled(
                    NewLedgerEntry {
                        payment_intent_id: target.payment_intent_id,
                        user_id,
                        listing_id: None,
                        amount: target.amount,
                        currency: target.currency,
                        kind: target.kind,
                        metadata: BTreeMap::new(),
                    },
                    LedgerStatus::Failed,
                    Some(message),
                    now,
                );
                self.ledger.insert_if_absent(&entry).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPaymentLedger;
    use crate::adapters::stripe::MockPaymentProcessor;
    use crate::ports::PaymentError;

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    fn pending_entry() -> LedgerEntry {
        LedgerEntry::pending(
            NewLedgerEntry {
                payment_intent_id: PaymentIntentId::new("pi_1").unwrap(),
                user_id: UserId::new("user-1").unwrap(),
                listing_id: None,
                amount: 150,
                currency: "mxn".to_string(),
                kind: PaymentKind::ListingBoost,
                metadata: BTreeMap::new(),
            },
            now(),
        )
    }

    fn target(entry: Option<LedgerEntry>) -> CompensationTarget {
        CompensationTarget {
            payment_intent_id: PaymentIntentId::new("pi_1").unwrap(),
            user_id: Some(UserId::new("user-1").unwrap()),
            amount: 150,
            currency: "mxn".to_string(),
            kind: PaymentKind::ListingBoost,
            entry,
        }
    }

    #[tokio::test]
    async fn refunds_and_marks_entry_compensated() {
        let processor = MockPaymentProcessor::new();
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let entry = pending_entry();
        ledger.insert_if_absent(&entry).await.unwrap();
        let compensator = RefundCompensator::new(Arc::new(processor.clone()), ledger.clone());

        let outcome = compensator
            .compensate(target(Some(entry)), "database unavailable", now())
            .await;

        assert!(matches!(outcome, WebhookOutcome::Failed(_)));
        let refunds = processor.refunds();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].payment_intent_id.as_str(), "pi_1");
        let stored = ledger.all().await.remove(0);
        assert!(is_compensated(&stored));
        assert_eq!(
            stored.error_message.as_deref(),
            Some("failed_service_activation: database unavailable")
        );
    }

    #[tokio::test]
    async fn refund_uses_payment_scoped_idempotency_key() {
        let processor = MockPaymentProcessor::new();
        let compensator = RefundCompensator::new(
            Arc::new(processor.clone()),
            Arc::new(InMemoryPaymentLedger::new()),
        );

        compensator.compensate(target(None), "boom", now()).await;

        let call = processor
            .calls()
            .into_iter()
            .find(|c| c.method == "create_refund")
            .unwrap();
        assert_eq!(call.args[1], COMPENSATION_REASON);
        assert_eq!(call.args[2], "refund-pi_1");
    }

    #[tokio::test]
    async fn missing_entry_is_recorded_as_failed() {
        let processor = MockPaymentProcessor::new();
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let compensator = RefundCompensator::new(Arc::new(processor), ledger.clone());

        compensator.compensate(target(None), "boom", now()).await;

        let stored = ledger.all().await.remove(0);
        assert_eq!(stored.status, LedgerStatus::Failed);
        assert!(is_compensated(&stored));
    }

    #[tokio::test]
    async fn failed_refund_is_not_marked_compensated() {
        let processor = MockPaymentProcessor::new();
        processor.set_method_error("create_refund", PaymentError::network("timeout"));
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let entry = pending_entry();
        ledger.insert_if_absent(&entry).await.unwrap();
        let compensator = RefundCompensator::new(Arc::new(processor), ledger.clone());

        let outcome = compensator.compensate(target(Some(entry)), "boom", now()).await;

        assert!(outcome.detail().contains("refund failed"));
        let stored = ledger.all().await.remove(0);
        assert_eq!(stored.status, LedgerStatus::Failed);
        assert!(!is_compensated(&stored));
    }
}
