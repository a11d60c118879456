//! Stripe payment processor adapter.
//!
//! Implements the `PaymentProcessor` port against the Stripe REST API:
//! payment intents for boosts, customers and subscriptions for premium,
//! invoices and refunds.
//!
//! # Conventions
//!
//! - Requests are form-encoded and authenticated with the secret key
//! - Writes carry an `Idempotency-Key` header
//! - 404 on a retrieve is `Ok(None)`, not an error
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key);
//! let processor = StripePaymentProcessor::new(config);
//! ```

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::domain::foundation::{CustomerId, PaymentIntentId, SubscriptionId};
use crate::ports::{
    CreateCustomerRequest, CreatePaymentIntentRequest, CreateRefundRequest,
    CreateSubscriptionRequest, Customer, Invoice, PaymentError, PaymentIntent, PaymentMethod,
    PaymentProcessor, Refund, Subscription,
};

use super::api_types::{
    error_from_response, StripeCustomer, StripeInvoice, StripeList, StripePaymentIntent,
    StripePaymentMethod, StripeRefund, StripeSubscription,
};

/// Default Stripe API host.
pub const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Refund metadata key for the compensation reason.
const REFUND_REASON_PARAM: &str = "metadata[reason]";

/// Expansion that brings the first invoice's client secret along.
const EXPAND_LATEST_INVOICE: (&str, &str) = ("expand[]", "latest_invoice.payment_intent");

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Per-request timeout.
    timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }
}

/// Stripe implementation of `PaymentProcessor`.
pub struct StripePaymentProcessor {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentProcessor {
    pub fn new(config: StripeConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self {
            config,
            http_client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
    }

    fn post(&self, path: &str, idempotency_key: Option<&str>) -> RequestBuilder {
        let request = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None);
        match idempotency_key {
            Some(key) => request.header("Idempotency-Key", key),
            None => request,
        }
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.http_client
            .delete(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
    }

    /// Sends a request and decodes the success body.
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, PaymentError> {
        match self.send_optional(operation, request).await? {
            Some(body) => Ok(body),
            None => Err(PaymentError::not_found(operation)),
        }
    }

    /// Like `send`, but a 404 is `Ok(None)`.
    async fn send_optional<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Option<T>, PaymentError> {
        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = error_from_response(status.as_u16(), &body);
            tracing::warn!(
                operation = operation,
                status = status.as_u16(),
                code = %error.code,
                "Stripe request failed"
            );
            return Err(error);
        }

        response.json::<T>().await.map(Some).map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe {} response: {}", operation, e))
        })
    }
}

fn metadata_params<'a>(
    metadata: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> Vec<(String, String)> {
    metadata
        .into_iter()
        .map(|(k, v)| (format!("metadata[{}]", k), v.clone()))
        .collect()
}

#[async_trait]
impl PaymentProcessor for StripePaymentProcessor {
    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut params = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        params.extend(metadata_params(&request.metadata));

        let intent: StripePaymentIntent = self
            .send(
                "payment_intent",
                self.post("payment_intents", Some(&request.idempotency_key))
                    .form(&params),
            )
            .await?;
        intent.try_into()
    }

    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        let intent: Option<StripePaymentIntent> = self
            .send_optional(
                "payment_intent",
                self.get(&format!("payment_intents/{}", id)),
            )
            .await?;
        intent.map(PaymentIntent::try_from).transpose()
    }

    async fn cancel_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, PaymentError> {
        let intent: StripePaymentIntent = self
            .send(
                "payment_intent",
                self.post(&format!("payment_intents/{}/cancel", id), None),
            )
            .await?;
        intent.try_into()
    }

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        let mut params = vec![("metadata[userId]".to_string(), request.user_id.to_string())];
        if let Some(email) = &request.email {
            params.push(("email".to_string(), email.clone()));
        }

        let customer: StripeCustomer = self
            .send(
                "customer",
                self.post("customers", Some(&request.idempotency_key))
                    .form(&params),
            )
            .await?;
        customer.try_into()
    }

    async fn retrieve_customer(&self, id: &CustomerId) -> Result<Option<Customer>, PaymentError> {
        let customer: Option<StripeCustomer> = self
            .send_optional("customer", self.get(&format!("customers/{}", id)))
            .await?;
        match customer {
            Some(customer) if !customer.deleted => Ok(Some(customer.try_into()?)),
            _ => Ok(None),
        }
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &CustomerId,
        payment_method_id: &str,
    ) -> Result<Customer, PaymentError> {
        let customer: StripeCustomer = self
            .send(
                "customer",
                self.post(&format!("customers/{}", customer_id), None)
                    .form(&[(
                        "invoice_settings[default_payment_method]",
                        payment_method_id,
                    )]),
            )
            .await?;
        customer.try_into()
    }

    async fn list_payment_methods(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<PaymentMethod>, PaymentError> {
        let list: StripeList<StripePaymentMethod> = self
            .send(
                "payment_methods",
                self.get("payment_methods")
                    .query(&[("customer", customer_id.as_str()), ("type", "card")]),
            )
            .await?;
        Ok(list.data.into_iter().map(PaymentMethod::from).collect())
    }

    async fn list_subscriptions(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<Subscription>, PaymentError> {
        let limit = limit.to_string();
        let list: StripeList<StripeSubscription> = self
            .send(
                "subscriptions",
                self.get("subscriptions").query(&[
                    ("customer", customer_id.as_str()),
                    ("status", "all"),
                    ("limit", limit.as_str()),
                    ("expand[]", "data.latest_invoice.payment_intent"),
                ]),
            )
            .await?;
        list.data.into_iter().map(Subscription::try_from).collect()
    }

    async fn retrieve_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, PaymentError> {
        let subscription: Option<StripeSubscription> = self
            .send_optional(
                "subscription",
                self.get(&format!("subscriptions/{}", id))
                    .query(&[EXPAND_LATEST_INVOICE]),
            )
            .await?;
        subscription.map(Subscription::try_from).transpose()
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, PaymentError> {
        let mut params = vec![
            ("customer".to_string(), request.customer_id.to_string()),
            ("items[0][price]".to_string(), request.price_id.clone()),
            (
                "payment_behavior".to_string(),
                "default_incomplete".to_string(),
            ),
            (
                "payment_settings[save_default_payment_method]".to_string(),
                "on_subscription".to_string(),
            ),
            (
                EXPAND_LATEST_INVOICE.0.to_string(),
                EXPAND_LATEST_INVOICE.1.to_string(),
            ),
        ];
        if let Some(method) = &request.default_payment_method {
            params.push(("default_payment_method".to_string(), method.clone()));
        }
        params.extend(metadata_params(&request.metadata));

        let subscription: StripeSubscription = self
            .send(
                "subscription",
                self.post("subscriptions", Some(&request.idempotency_key))
                    .form(&params),
            )
            .await?;
        subscription.try_into()
    }

    async fn cancel_subscription(
        &self,
        id: &SubscriptionId,
        at_period_end: bool,
    ) -> Result<Subscription, PaymentError> {
        let path = format!("subscriptions/{}", id);
        let request = if at_period_end {
            self.post(&path, None)
                .form(&[("cancel_at_period_end", "true")])
        } else {
            self.delete(&path)
        };

        let subscription: StripeSubscription = self.send("subscription", request).await?;
        subscription.try_into()
    }

    async fn list_invoices(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<Invoice>, PaymentError> {
        let limit = limit.to_string();
        let list: StripeList<StripeInvoice> = self
            .send(
                "invoices",
                self.get("invoices")
                    .query(&[("customer", customer_id.as_str()), ("limit", limit.as_str())]),
            )
            .await?;
        Ok(list.data.into_iter().map(Invoice::from).collect())
    }

    async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund, PaymentError> {
        let params = [
            ("payment_intent", request.payment_intent_id.as_str()),
            (REFUND_REASON_PARAM, request.reason.as_str()),
        ];

        let refund: StripeRefund = self
            .send(
                "refund",
                self.post("refunds", Some(&request.idempotency_key))
                    .form(&params),
            )
            .await?;
        refund.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn test_config() -> StripeConfig {
        StripeConfig::new(SecretString::new("sk_test_123".to_string()))
    }

    #[test]
    fn config_new_sets_defaults() {
        let config = test_config();
        assert_eq!(config.api_base_url(), DEFAULT_API_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn config_with_base_url_trims_trailing_slash() {
        let config = test_config().with_base_url("http://localhost:12111/");
        assert_eq!(config.api_base_url(), "http://localhost:12111");
    }

    #[test]
    fn urls_are_versioned() {
        let processor = StripePaymentProcessor::new(test_config());
        assert_eq!(
            processor.url("payment_intents/pi_1"),
            "https://api.stripe.com/v1/payment_intents/pi_1"
        );
    }

    #[test]
    fn metadata_uses_bracket_keys() {
        let mut metadata = BTreeMap::new();
        metadata.insert("listingId".to_string(), "abc".to_string());
        metadata.insert("planId".to_string(), "24h".to_string());

        let params = metadata_params(&metadata);

        assert_eq!(
            params,
            vec![
                ("metadata[listingId]".to_string(), "abc".to_string()),
                ("metadata[planId]".to_string(), "24h".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_a_retryable_network_error() {
        let processor = StripePaymentProcessor::new(
            test_config()
                .with_base_url("http://127.0.0.1:9")
                .with_timeout(Duration::from_millis(500)),
        );

        let err = processor
            .retrieve_payment_intent(&PaymentIntentId::new("pi_1").unwrap())
            .await
            .unwrap_err();

        assert!(err.retryable);
    }
}
