//! Typed views of the `data.object` payloads the reconciler reads.
//!
//! Every field is optional or defaulted: the processor adds and moves
//! fields between API versions, and a missing field must surface as a
//! handler decision, not a parse failure.

use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::domain::subscription::{SubscriptionSnapshot, SubscriptionState};

/// A payment intent.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_received: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<PaymentErrorObject>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentErrorObject {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A charge. Carries its intent id in `payment_intent`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// An invoice.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
    #[serde(default)]
    pub lines: Option<InvoiceLines>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<InvoiceSubscriptionDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLines {
    #[serde(default)]
    pub data: Vec<InvoiceLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLine {
    #[serde(default)]
    pub period: Option<LinePeriod>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LinePeriod {
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
}

impl InvoiceObject {
    /// Subscription id, from the top-level field or from `parent` on newer API versions.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_deref().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|p| p.subscription_details.as_ref())
                .and_then(|d| d.subscription.as_deref())
        })
    }

    /// End of the first line item's period (Unix seconds).
    pub fn line_period_end(&self) -> Option<i64> {
        self.lines
            .as_ref()
            .and_then(|l| l.data.first())
            .and_then(|line| line.period)
            .and_then(|p| p.end)
    }
}

/// A subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: Option<SubscriptionItems>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub price: Option<PriceObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceObject {
    pub id: String,
}

impl SubscriptionObject {
    fn first_item(&self) -> Option<&SubscriptionItem> {
        self.items.as_ref().and_then(|i| i.data.first())
    }

    /// Period end, from the subscription or from its first item on newer API versions.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.first_item().and_then(|i| i.current_period_end))
    }

    pub fn price_id(&self) -> Option<&str> {
        self.first_item()
            .and_then(|i| i.price.as_ref())
            .map(|p| p.id.as_str())
    }

    /// Snapshot of this subscription. `None` if the id is blank.
    pub fn to_snapshot(&self) -> Option<SubscriptionSnapshot> {
        let id = SubscriptionId::new(self.id.clone()).ok()?;
        let mut snapshot = SubscriptionSnapshot::new(id, SubscriptionState::parse(&self.status))
            .with_current_period_end(self.period_end().and_then(Timestamp::from_unix_secs));
        snapshot.cancel_at_period_end = self.cancel_at_period_end;
        snapshot.price_id = self.price_id().map(String::from);
        snapshot.metadata = self.metadata.clone();
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invoice_reads_subscription_from_parent_details() {
        let invoice: InvoiceObject = serde_json::from_value(json!({
            "id": "in_1",
            "parent": {"subscription_details": {"subscription": "sub_9"}},
            "lines": {"data": [{"period": {"start": 1, "end": 1_707_955_200}}]}
        }))
        .unwrap();

        assert_eq!(invoice.subscription_id(), Some("sub_9"));
        assert_eq!(invoice.line_period_end(), Some(1_707_955_200));
    }

    #[test]
    fn invoice_prefers_top_level_subscription() {
        let invoice: InvoiceObject = serde_json::from_value(json!({
            "id": "in_1",
            "subscription": "sub_top",
            "parent": {"subscription_details": {"subscription": "sub_parent"}}
        }))
        .unwrap();
        assert_eq!(invoice.subscription_id(), Some("sub_top"));
    }

    #[test]
    fn subscription_period_end_falls_back_to_first_item() {
        let sub: SubscriptionObject = serde_json::from_value(json!({
            "id": "sub_1",
            "status": "active",
            "metadata": {"type": "premium", "userId": "u1"},
            "items": {"data": [{"current_period_end": 1_707_955_200, "price": {"id": "price_p"}}]}
        }))
        .unwrap();

        let snapshot = sub.to_snapshot().unwrap();
        assert_eq!(sub.period_end(), Some(1_707_955_200));
        assert_eq!(snapshot.price_id.as_deref(), Some("price_p"));
        assert!(snapshot.is_premium());
        assert_eq!(snapshot.user_id(), Some("u1"));
    }

    #[test]
    fn payment_intent_tolerates_missing_fields() {
        let pi: PaymentIntentObject = serde_json::from_value(json!({"id": "pi_1"})).unwrap();
        assert_eq!(pi.amount, 0);
        assert!(pi.metadata.is_empty());
    }
}
