//! HTTP DTOs for boost, premium, and webhook endpoints.
//!
//! Field names follow the camelCase JSON the marketplace clients already use.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{
    BoostPaymentSummary, CancelPremiumResult, GetBoostStatusResult, GetPremiumStatusResult,
    RequestBoostResult, RequestPremiumResult, SubscriptionView, SyncPremiumResult,
};
use crate::domain::ledger::LedgerStatus;
use crate::domain::promotion::{BoostPlanId, RemainingTime};
use crate::ports::Invoice;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /service/boost/{listingId}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostRequest {
    #[serde(default)]
    pub plan_id: String,
}

/// Body of `POST /user/premium/cancel`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPremiumRequest {
    #[serde(default = "default_at_period_end")]
    pub at_period_end: bool,
}

impl Default for CancelPremiumRequest {
    fn default() -> Self {
        Self {
            at_period_end: default_at_period_end(),
        }
    }
}

fn default_at_period_end() -> bool {
    true
}

// ════════════════════════════════════════════════════════════════════════════════
// Boost Responses
// ════════════════════════════════════════════════════════════════════════════════

/// Payment handle returned by `POST /service/boost/{listingId}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostResponse {
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub payment_intent_id: String,
    pub status: String,
}

impl From<RequestBoostResult> for BoostResponse {
    fn from(result: RequestBoostResult) -> Self {
        Self {
            client_secret: result.client_secret,
            amount: result.amount,
            currency: result.currency,
            payment_intent_id: result.payment_intent_id.to_string(),
            status: result.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingTimeResponse {
    pub hours: i64,
    pub minutes: i64,
    pub total_millis: i64,
}

impl From<RemainingTime> for RemainingTimeResponse {
    fn from(remaining: RemainingTime) -> Self {
        Self {
            hours: remaining.hours,
            minutes: remaining.minutes,
            total_millis: remaining.total_millis,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostPaymentResponse {
    pub amount: i64,
    pub currency: String,
    pub status: LedgerStatus,
    pub plan: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<BoostPaymentSummary> for BoostPaymentResponse {
    fn from(summary: BoostPaymentSummary) -> Self {
        Self {
            amount: summary.amount,
            currency: summary.currency,
            status: summary.status,
            plan: summary.plan,
            created_at: summary.created_at.to_string(),
            completed_at: summary.completed_at.map(|t| t.to_string()),
        }
    }
}

/// Body of `GET /service/boost/{listingId}/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostStatusResponse {
    pub is_promoted: bool,
    pub promoted_until: Option<String>,
    pub promotion_plan: Option<BoostPlanId>,
    pub remaining_time: Option<RemainingTimeResponse>,
    pub payment_history: Vec<BoostPaymentResponse>,
}

impl From<GetBoostStatusResult> for BoostStatusResponse {
    fn from(result: GetBoostStatusResult) -> Self {
        Self {
            is_promoted: result.is_promoted,
            promoted_until: result.promoted_until.map(|t| t.to_string()),
            promotion_plan: result.promotion_plan,
            remaining_time: result.remaining_time.map(RemainingTimeResponse::from),
            payment_history: result
                .payment_history
                .into_iter()
                .map(BoostPaymentResponse::from)
                .collect(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Premium Responses
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /user/premium`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum PremiumResponse {
    Created {
        client_secret: Option<String>,
        subscription_id: String,
        status: String,
    },
    AlreadyPremium {
        already_premium: bool,
        subscription_id: String,
        status: String,
        current_period_end: Option<String>,
    },
}

impl From<RequestPremiumResult> for PremiumResponse {
    fn from(result: RequestPremiumResult) -> Self {
        match result {
            RequestPremiumResult::Created {
                client_secret,
                subscription_id,
                status,
            } => PremiumResponse::Created {
                client_secret,
                subscription_id: subscription_id.to_string(),
                status: status.as_str().to_string(),
            },
            RequestPremiumResult::AlreadyPremium {
                subscription_id,
                status,
                current_period_end,
            } => PremiumResponse::AlreadyPremium {
                already_premium: true,
                subscription_id: subscription_id.to_string(),
                status: status.as_str().to_string(),
                current_period_end: current_period_end.map(|t| t.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<String>,
    pub cancel_at_period_end: bool,
}

impl From<SubscriptionView> for SubscriptionResponse {
    fn from(view: SubscriptionView) -> Self {
        Self {
            id: view.id.to_string(),
            status: view.status.as_str().to_string(),
            price_id: view.price_id,
            current_period_end: view.current_period_end.map(|t| t.to_string()),
            cancel_at_period_end: view.cancel_at_period_end,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub id: String,
    pub status: Option<String>,
    pub amount_paid: i64,
    pub currency: String,
    /// Unix seconds.
    pub created: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_invoice_url: Option<String>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id,
            status: invoice.status,
            amount_paid: invoice.amount_paid,
            currency: invoice.currency,
            created: invoice.created,
            hosted_invoice_url: invoice.hosted_invoice_url,
        }
    }
}

/// Body of `GET /user/premium/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumStatusResponse {
    pub is_premium: bool,
    pub premium_until: Option<String>,
    pub customer_id: Option<String>,
    pub subscription: Option<SubscriptionResponse>,
    pub invoices: Vec<InvoiceResponse>,
}

impl From<GetPremiumStatusResult> for PremiumStatusResponse {
    fn from(result: GetPremiumStatusResult) -> Self {
        Self {
            is_premium: result.is_premium,
            premium_until: result.premium_until.map(|t| t.to_string()),
            customer_id: result.customer_id.map(|c| c.to_string()),
            subscription: result.subscription.map(SubscriptionResponse::from),
            invoices: result.invoices.into_iter().map(InvoiceResponse::from).collect(),
        }
    }
}

/// Body of `POST /user/premium/cancel`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPremiumResponse {
    pub subscription_id: String,
    pub status: String,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<String>,
    pub is_premium: bool,
    pub premium_until: Option<String>,
}

impl From<CancelPremiumResult> for CancelPremiumResponse {
    fn from(result: CancelPremiumResult) -> Self {
        Self {
            subscription_id: result.subscription_id.to_string(),
            status: result.status.as_str().to_string(),
            cancel_at_period_end: result.cancel_at_period_end,
            current_period_end: result.current_period_end.map(|t| t.to_string()),
            is_premium: result.premium.is_premium,
            premium_until: result.premium.premium_until.map(|t| t.to_string()),
        }
    }
}

/// Body of `POST /user/premium/sync`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPremiumResponse {
    pub is_premium: bool,
    pub premium_until: Option<String>,
    pub subscription_id: Option<String>,
    pub status: Option<String>,
}

impl From<SyncPremiumResult> for SyncPremiumResponse {
    fn from(result: SyncPremiumResult) -> Self {
        Self {
            is_premium: result.premium.is_premium,
            premium_until: result.premium.premium_until.map(|t| t.to_string()),
            subscription_id: result.subscription_id.map(|s| s.to_string()),
            status: result.status.map(|s| s.as_str().to_string()),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook and Shared Responses
// ════════════════════════════════════════════════════════════════════════════════

/// Acknowledgement sent for every verified webhook delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

impl WebhookAck {
    pub fn received() -> Self {
        Self { received: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Lowercase error code for programmatic handling.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{PaymentIntentId, SubscriptionId, Timestamp};
    use crate::domain::subscription::{PremiumStatus, SubscriptionState};
    use crate::ports::PaymentIntentStatus;
    use serde_json::json;

    fn ts() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    #[test]
    fn boost_request_reads_camel_case_plan_id() {
        let request: BoostRequest = serde_json::from_value(json!({"planId": "72h"})).unwrap();
        assert_eq!(request.plan_id, "72h");
    }

    #[test]
    fn boost_request_without_plan_yields_empty_plan() {
        let request: BoostRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.plan_id.is_empty());
    }

    #[test]
    fn cancel_request_defaults_to_period_end() {
        let request: CancelPremiumRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.at_period_end);

        let request: CancelPremiumRequest =
            serde_json::from_value(json!({"atPeriodEnd": false})).unwrap();
        assert!(!request.at_period_end);
    }

    #[test]
    fn boost_response_serializes_wire_fields() {
        let response = BoostResponse::from(RequestBoostResult {
            client_secret: Some("pi_1_secret".to_string()),
            amount: 150,
            currency: "mxn".to_string(),
            payment_intent_id: PaymentIntentId::new("pi_1").unwrap(),
            status: PaymentIntentStatus::RequiresPaymentMethod,
            reused: false,
        });

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["clientSecret"], "pi_1_secret");
        assert_eq!(value["paymentIntentId"], "pi_1");
        assert_eq!(value["amount"], 150);
        assert_eq!(value["status"], "requires_payment_method");
    }

    #[test]
    fn already_premium_carries_flag() {
        let response = PremiumResponse::from(RequestPremiumResult::AlreadyPremium {
            subscription_id: SubscriptionId::new("sub_1").unwrap(),
            status: SubscriptionState::Active,
            current_period_end: Some(ts()),
        });

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["alreadyPremium"], true);
        assert_eq!(value["subscriptionId"], "sub_1");
        assert_eq!(value["currentPeriodEnd"], "2024-01-15T00:00:00.000Z");
    }

    #[test]
    fn created_premium_has_no_flag() {
        let response = PremiumResponse::from(RequestPremiumResult::Created {
            client_secret: Some("pi_2_secret".to_string()),
            subscription_id: SubscriptionId::new("sub_2").unwrap(),
            status: SubscriptionState::Incomplete,
        });

        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("alreadyPremium").is_none());
        assert_eq!(value["clientSecret"], "pi_2_secret");
        assert_eq!(value["status"], "incomplete");
    }

    #[test]
    fn boost_status_serializes_remaining_time() {
        let response = BoostStatusResponse::from(GetBoostStatusResult {
            is_promoted: true,
            promoted_until: Some(ts()),
            promotion_plan: Some(BoostPlanId::ThreeDays),
            remaining_time: Some(RemainingTime {
                hours: 2,
                minutes: 30,
                total_millis: 9_000_000,
            }),
            payment_history: vec![],
        });

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["isPromoted"], true);
        assert_eq!(value["promotionPlan"], "72h");
        assert_eq!(value["remainingTime"]["totalMillis"], 9_000_000);
    }

    #[test]
    fn sync_response_reports_cleared_premium() {
        let response = SyncPremiumResponse::from(SyncPremiumResult {
            premium: PremiumStatus::free(),
            subscription_id: None,
            status: None,
        });

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["isPremium"], false);
        assert!(value["premiumUntil"].is_null());
    }

    #[test]
    fn error_response_omits_missing_details() {
        let value = serde_json::to_value(ErrorResponse::new("forbidden", "nope")).unwrap();
        assert_eq!(value["error"], "forbidden");
        assert!(value.get("details").is_none());
    }
}
