//! PaymentProcessor port - the contract expected from the payment gateway.
//!
//! Covers one-off payment intents for listing boosts, customers and
//! subscriptions for premium, invoices for status views, and refunds for
//! compensation. Webhook verification is not part of this port; see
//! `domain::webhook::WebhookVerifier`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, PaymentIntentId, SubscriptionId, Timestamp, UserId,
};
use crate::domain::subscription::{SubscriptionSnapshot, SubscriptionState};

/// Port for payment gateway operations.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a payment intent. Same idempotency key, same intent.
    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Retrieve a payment intent. `None` if the processor does not know it.
    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<Option<PaymentIntent>, PaymentError>;

    /// Cancel a payment intent the client has not completed.
    async fn cancel_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Create a customer for a user.
    async fn create_customer(&self, request: CreateCustomerRequest)
        -> Result<Customer, PaymentError>;

    /// Retrieve a customer, including its default payment method.
    async fn retrieve_customer(&self, id: &CustomerId) -> Result<Option<Customer>, PaymentError>;

    /// Make an attached payment method the customer's invoice default.
    async fn set_default_payment_method(
        &self,
        customer_id: &CustomerId,
        payment_method_id: &str,
    ) -> Result<Customer, PaymentError>;

    /// Card payment methods attached to a customer.
    async fn list_payment_methods(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<PaymentMethod>, PaymentError>;

    /// Subscriptions of a customer in any status, newest first.
    async fn list_subscriptions(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<Subscription>, PaymentError>;

    /// Retrieve one subscription.
    async fn retrieve_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, PaymentError>;

    /// Create a subscription whose first invoice is confirmed client-side.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, PaymentError>;

    /// Cancel a subscription now, or flag it to end with the current period.
    async fn cancel_subscription(
        &self,
        id: &SubscriptionId,
        at_period_end: bool,
    ) -> Result<Subscription, PaymentError>;

    /// Invoices of a customer, newest first.
    async fn list_invoices(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<Invoice>, PaymentError>;

    /// Refund a payment intent in full.
    async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund, PaymentError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════════

/// Request to create a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePaymentIntentRequest {
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: String,
    pub metadata: BTreeMap<String, String>,
    pub idempotency_key: String,
}

/// Request to create a customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCustomerRequest {
    pub user_id: UserId,
    pub email: Option<String>,
    pub idempotency_key: String,
}

/// Request to create a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubscriptionRequest {
    pub customer_id: CustomerId,
    pub price_id: String,
    pub default_payment_method: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub idempotency_key: String,
}

/// Request to refund a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRefundRequest {
    pub payment_intent_id: PaymentIntentId,
    /// Stored in refund metadata; the processor's own reason field is a closed set.
    pub reason: String,
    pub idempotency_key: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Processor objects
// ════════════════════════════════════════════════════════════════════════════════

/// Processor-side status of a payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    Unknown(String),
}

impl PaymentIntentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "processing" => Self::Processing,
            "requires_capture" => Self::RequiresCapture,
            "canceled" => Self::Canceled,
            "succeeded" => Self::Succeeded,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Unknown(raw) => raw,
        }
    }

    /// The client can still complete this intent.
    pub fn is_awaitable(&self) -> bool {
        matches!(
            self,
            Self::RequiresPaymentMethod
                | Self::RequiresConfirmation
                | Self::RequiresAction
                | Self::Processing
        )
    }
}

/// A single charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
    pub metadata: BTreeMap<String, String>,
}

/// A processor customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: CustomerId,
    pub email: Option<String>,
    /// `invoice_settings.default_payment_method`.
    pub default_payment_method: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// A stored payment method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMethod {
    pub id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
}

/// The invoice a subscription most recently produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestInvoice {
    pub id: String,
    pub amount_due: i64,
    pub currency: String,
    /// End of the latest line item period (Unix seconds).
    pub period_end: Option<i64>,
    pub payment_intent_id: Option<PaymentIntentId>,
    pub client_secret: Option<String>,
}

/// A recurring subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub status: SubscriptionState,
    pub price_id: Option<String>,
    /// Unix seconds.
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    pub metadata: BTreeMap<String, String>,
    pub latest_invoice: Option<LatestInvoice>,
}

impl Subscription {
    /// Snapshot for premium reconciliation. `invoice_period_end` overrides the
    /// latest invoice's period when the caller holds a fresher invoice.
    pub fn to_snapshot(&self, invoice_period_end: Option<i64>) -> SubscriptionSnapshot {
        let invoice_end = invoice_period_end
            .or_else(|| self.latest_invoice.as_ref().and_then(|i| i.period_end))
            .and_then(Timestamp::from_unix_secs);
        let mut snapshot = SubscriptionSnapshot::new(self.id.clone(), self.status.clone())
            .with_current_period_end(self.current_period_end.and_then(Timestamp::from_unix_secs))
            .with_invoice_period_end(invoice_end);
        snapshot.cancel_at_period_end = self.cancel_at_period_end;
        snapshot.price_id = self.price_id.clone();
        snapshot.metadata = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        snapshot
    }
}

/// An invoice summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    pub id: String,
    pub status: Option<String>,
    pub amount_paid: i64,
    pub currency: String,
    /// Unix seconds.
    pub created: i64,
    pub hosted_invoice_url: Option<String>,
}

/// A refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    pub id: String,
    pub status: String,
    pub payment_intent_id: PaymentIntentId,
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// Errors from payment processor operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,
    /// Processor's own error code, if any.
    pub provider_code: Option<String>,
    pub retryable: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::AuthenticationError, message)
    }

    pub fn card_declined(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::CardDeclined, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        let code = match err.code {
            PaymentErrorCode::NotFound => ErrorCode::SubscriptionNotFound,
            _ => ErrorCode::PaymentProviderError,
        };
        let mut domain = DomainError::new(code, err.message);
        if let Some(provider_code) = err.provider_code {
            domain = domain.with_detail("provider_code", provider_code);
        }
        domain
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    NetworkError,
    AuthenticationError,
    CardDeclined,
    InvalidRequest,
    IdempotencyConflict,
    NotFound,
    RateLimitExceeded,
    ProviderError,
    Unknown,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError | PaymentErrorCode::RateLimitExceeded
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::CardDeclined => "card_declined",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::IdempotencyConflict => "idempotency_conflict",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
