//! Stripe API objects as returned by the REST endpoints.
//!
//! Only the fields the marketplace reads are modelled; everything else in the
//! response is ignored. Each type converts into its port counterpart.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::domain::foundation::{CustomerId, PaymentIntentId, SubscriptionId};
use crate::domain::subscription::SubscriptionState;
use crate::ports::{
    Customer, Invoice, LatestInvoice, PaymentError, PaymentErrorCode, PaymentIntent,
    PaymentIntentStatus, PaymentMethod, Refund, Subscription,
};

/// A field Stripe returns either as an id or, when expanded, as the object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

impl<T: HasId> Expandable<T> {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(object) => object.id(),
        }
    }

    pub fn object(&self) -> Option<&T> {
        match self {
            Expandable::Id(_) => None,
            Expandable::Object(object) => Some(object.as_ref()),
        }
    }
}

pub trait HasId {
    fn id(&self) -> &str;
}

/// Paginated list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

fn to_btree(metadata: HashMap<String, String>) -> BTreeMap<String, String> {
    metadata.into_iter().collect()
}

fn invalid_response(field: &str) -> PaymentError {
    PaymentError::provider(format!("Stripe response missing valid {}", field))
}

// ════════════════════════════════════════════════════════════════════════════════
// Payment intents and refunds
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl HasId for StripePaymentIntent {
    fn id(&self) -> &str {
        &self.id
    }
}

impl TryFrom<StripePaymentIntent> for PaymentIntent {
    type Error = PaymentError;

    fn try_from(intent: StripePaymentIntent) -> Result<Self, Self::Error> {
        Ok(PaymentIntent {
            id: PaymentIntentId::new(intent.id).map_err(|_| invalid_response("id"))?,
            client_secret: intent.client_secret,
            amount: intent.amount,
            currency: intent.currency,
            status: PaymentIntentStatus::parse(&intent.status),
            metadata: to_btree(intent.metadata),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeRefund {
    pub id: String,
    pub status: Option<String>,
    pub payment_intent: Option<String>,
}

impl TryFrom<StripeRefund> for Refund {
    type Error = PaymentError;

    fn try_from(refund: StripeRefund) -> Result<Self, Self::Error> {
        let payment_intent = refund
            .payment_intent
            .ok_or_else(|| invalid_response("payment_intent"))?;
        Ok(Refund {
            id: refund.id,
            status: refund.status.unwrap_or_else(|| "pending".to_string()),
            payment_intent_id: PaymentIntentId::new(payment_intent)
                .map_err(|_| invalid_response("payment_intent"))?,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Customers and payment methods
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub invoice_settings: Option<InvoiceSettings>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSettings {
    #[serde(default)]
    pub default_payment_method: Option<Expandable<StripePaymentMethod>>,
}

impl TryFrom<StripeCustomer> for Customer {
    type Error = PaymentError;

    fn try_from(customer: StripeCustomer) -> Result<Self, Self::Error> {
        let default_payment_method = customer
            .invoice_settings
            .and_then(|s| s.default_payment_method)
            .map(|pm| pm.id().to_string());
        Ok(Customer {
            id: CustomerId::new(customer.id).map_err(|_| invalid_response("id"))?,
            email: customer.email,
            default_payment_method,
            metadata: to_btree(customer.metadata),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentMethod {
    pub id: String,
    #[serde(default)]
    pub card: Option<StripeCard>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCard {
    pub brand: Option<String>,
    pub last4: Option<String>,
}

impl HasId for StripePaymentMethod {
    fn id(&self) -> &str {
        &self.id
    }
}

impl From<StripePaymentMethod> for PaymentMethod {
    fn from(method: StripePaymentMethod) -> Self {
        let (brand, last4) = match method.card {
            Some(card) => (card.brand, card.last4),
            None => (None, None),
        };
        PaymentMethod {
            id: method.id,
            brand,
            last4,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscriptions and invoices
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Expandable<StripeCustomer>,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: Option<StripeList<StripeSubscriptionItem>>,
    #[serde(default)]
    pub latest_invoice: Option<Expandable<StripeInvoice>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub price: Option<StripePrice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
}

impl HasId for StripeCustomer {
    fn id(&self) -> &str {
        &self.id
    }
}

impl TryFrom<StripeSubscription> for Subscription {
    type Error = PaymentError;

    fn try_from(sub: StripeSubscription) -> Result<Self, Self::Error> {
        let first_item = sub.items.as_ref().and_then(|items| items.data.first());
        // Newer API versions report the period on the item only.
        let current_period_end = sub
            .current_period_end
            .or_else(|| first_item.and_then(|item| item.current_period_end));
        let price_id = first_item
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.clone());
        let latest_invoice = match sub.latest_invoice {
            Some(Expandable::Object(invoice)) => Some(LatestInvoice::from(*invoice)),
            Some(Expandable::Id(id)) => Some(LatestInvoice {
                id,
                amount_due: 0,
                currency: String::new(),
                period_end: None,
                payment_intent_id: None,
                client_secret: None,
            }),
            None => None,
        };

        Ok(Subscription {
            id: SubscriptionId::new(sub.id).map_err(|_| invalid_response("id"))?,
            customer_id: CustomerId::new(sub.customer.id())
                .map_err(|_| invalid_response("customer"))?,
            status: SubscriptionState::parse(&sub.status),
            price_id,
            current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
            metadata: to_btree(sub.metadata),
            latest_invoice,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<Expandable<StripePaymentIntent>>,
    /// Client secret on API versions that no longer expose the intent.
    #[serde(default)]
    pub confirmation_secret: Option<ConfirmationSecret>,
    #[serde(default)]
    pub lines: Option<StripeList<StripeInvoiceLine>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationSecret {
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoiceLine {
    #[serde(default)]
    pub period: Option<StripePeriod>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePeriod {
    #[serde(default)]
    pub end: Option<i64>,
}

impl HasId for StripeInvoice {
    fn id(&self) -> &str {
        &self.id
    }
}

impl From<StripeInvoice> for LatestInvoice {
    fn from(invoice: StripeInvoice) -> Self {
        let period_end = invoice
            .lines
            .as_ref()
            .and_then(|lines| lines.data.first())
            .and_then(|line| line.period.as_ref())
            .and_then(|period| period.end);
        let intent = invoice.payment_intent.as_ref();
        let client_secret = intent
            .and_then(|pi| pi.object())
            .and_then(|pi| pi.client_secret.clone())
            .or_else(|| {
                invoice
                    .confirmation_secret
                    .as_ref()
                    .and_then(|s| s.client_secret.clone())
            });
        LatestInvoice {
            payment_intent_id: intent.and_then(|pi| PaymentIntentId::new(pi.id()).ok()),
            id: invoice.id,
            amount_due: invoice.amount_due,
            currency: invoice.currency,
            period_end,
            client_secret,
        }
    }
}

impl From<StripeInvoice> for Invoice {
    fn from(invoice: StripeInvoice) -> Self {
        Invoice {
            id: invoice.id,
            status: invoice.status,
            amount_paid: invoice.amount_paid,
            currency: invoice.currency,
            created: invoice.created,
            hosted_invoice_url: invoice.hosted_invoice_url,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorBody {
    pub error: StripeApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiError {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Maps a non-success response to a `PaymentError`.
pub fn error_from_response(status: u16, body: &str) -> PaymentError {
    let api_error = serde_json::from_str::<StripeErrorBody>(body).ok().map(|b| b.error);
    let message = api_error
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| format!("Stripe API error (HTTP {})", status));
    let error_type = api_error.as_ref().and_then(|e| e.error_type.as_deref());

    let code = match (status, error_type) {
        (_, Some("card_error")) | (402, _) => PaymentErrorCode::CardDeclined,
        (_, Some("idempotency_error")) => PaymentErrorCode::IdempotencyConflict,
        (401, _) | (403, _) => PaymentErrorCode::AuthenticationError,
        (404, _) => PaymentErrorCode::NotFound,
        (429, _) => PaymentErrorCode::RateLimitExceeded,
        (400, _) => PaymentErrorCode::InvalidRequest,
        (500..=599, _) => PaymentErrorCode::ProviderError,
        _ => PaymentErrorCode::Unknown,
    };

    let mut error = PaymentError::new(code, message);
    if let Some(provider_code) = api_error.and_then(|e| e.code) {
        error = error.with_provider_code(provider_code);
    }
    error
}
