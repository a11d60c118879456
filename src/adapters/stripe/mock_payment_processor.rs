//! Mock payment processor for testing.
//!
//! Provides a configurable implementation of `PaymentProcessor` for unit and
//! integration tests. Supports:
//! - Idempotency keys (same key, same object), like the real processor
//! - Error injection per method or for the next call
//! - Call tracking
//! - Driving intent and subscription state from the test

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, PaymentIntentId, SubscriptionId};
use crate::domain::subscription::SubscriptionState;
use crate::ports::{
    CreateCustomerRequest, CreatePaymentIntentRequest, CreateRefundRequest,
    CreateSubscriptionRequest, Customer, Invoice, LatestInvoice, PaymentError, PaymentIntent,
    PaymentIntentStatus, PaymentMethod, PaymentProcessor, Refund, Subscription,
};

/// Mock payment processor for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProcessor::new();
///
/// // Inject errors
/// mock.set_method_error("create_refund", PaymentError::network("reset"));
///
/// // Assert on calls
/// assert_eq!(mock.call_count("create_payment_intent"), 1);
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentProcessor {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    intents: HashMap<String, PaymentIntent>,
    customers: HashMap<String, Customer>,
    payment_methods: HashMap<String, Vec<PaymentMethod>>,
    subscriptions: Vec<Subscription>,
    invoices: HashMap<String, Vec<Invoice>>,
    refunds: Vec<Refund>,

    /// Idempotency key -> object id, per method.
    idempotency: HashMap<(String, String), String>,

    /// Period length granted to new subscriptions, in seconds.
    subscription_period_secs: Option<i64>,

    next_error: Option<PaymentError>,
    method_errors: HashMap<String, PaymentError>,
    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

const DEFAULT_PERIOD_SECS: i64 = 30 * 24 * 60 * 60;

fn short_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_mock_{}", prefix, &uuid[..12])
}

impl MockPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Add a customer to the "database".
    pub fn add_customer(&self, customer: Customer) {
        self.state()
            .customers
            .insert(customer.id.as_str().to_string(), customer);
    }

    /// Attach a card to a customer, optionally as the invoice default.
    pub fn attach_payment_method(&self, customer_id: &CustomerId, method: PaymentMethod, default: bool) {
        let mut state = self.state();
        if default {
            if let Some(customer) = state.customers.get_mut(customer_id.as_str()) {
                customer.default_payment_method = Some(method.id.clone());
            }
        }
        state
            .payment_methods
            .entry(customer_id.as_str().to_string())
            .or_default()
            .push(method);
    }

    /// Add a subscription; newest added is listed first.
    pub fn add_subscription(&self, subscription: Subscription) {
        self.state().subscriptions.push(subscription);
    }

    pub fn add_invoice(&self, customer_id: &CustomerId, invoice: Invoice) {
        self.state()
            .invoices
            .entry(customer_id.as_str().to_string())
            .or_default()
            .push(invoice);
    }

    /// Simulate the client confirming (or abandoning) an intent.
    pub fn set_intent_status(&self, id: &PaymentIntentId, status: PaymentIntentStatus) {
        if let Some(intent) = self.state().intents.get_mut(id.as_str()) {
            intent.status = status;
        }
    }

    pub fn set_subscription_status(&self, id: &SubscriptionId, status: SubscriptionState) {
        let mut state = self.state();
        if let Some(sub) = state.subscriptions.iter_mut().find(|s| &s.id == id) {
            sub.status = status;
        }
    }

    pub fn set_subscription_period_secs(&self, secs: i64) {
        self.state().subscription_period_secs = Some(secs);
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: PaymentError) {
        self.state().next_error = Some(error);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Inspection
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    pub fn intent(&self, id: &PaymentIntentId) -> Option<PaymentIntent> {
        self.state().intents.get(id.as_str()).cloned()
    }

    pub fn intent_count(&self) -> usize {
        self.state().intents.len()
    }

    pub fn refunds(&self) -> Vec<Refund> {
        self.state().refunds.clone()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.state().subscriptions.clone()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), PaymentError> {
        let mut state = self.state();

        // Check method-specific error first
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }

        // Check global error (consumes it)
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        Ok(())
    }
}

fn idempotent_lookup(state: &MockState, method: &str, key: &str) -> Option<String> {
    state
        .idempotency
        .get(&(method.to_string(), key.to_string()))
        .cloned()
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError> {
        self.record_call(
            "create_payment_intent",
            vec![
                request.amount.to_string(),
                request.currency.clone(),
                request.idempotency_key.clone(),
            ],
        );
        self.check_error("create_payment_intent")?;

        let mut state = self.state();
        if let Some(id) = idempotent_lookup(&state, "create_payment_intent", &request.idempotency_key) {
            if let Some(intent) = state.intents.get(&id) {
                return Ok(intent.clone());
            }
        }

        let id = short_id("pi");
        let intent = PaymentIntent {
            id: PaymentIntentId::new(id.clone()).map_err(|e| PaymentError::provider(e.to_string()))?,
            client_secret: Some(format!("{}_secret_{}", id, &short_id("cs")[8..])),
            amount: request.amount,
            currency: request.currency,
            status: PaymentIntentStatus::RequiresPaymentMethod,
            metadata: request.metadata,
        };
        state.idempotency.insert(
            ("create_payment_intent".to_string(), request.idempotency_key),
            id.clone(),
        );
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        self.record_call("retrieve_payment_intent", vec![id.to_string()]);
        self.check_error("retrieve_payment_intent")?;
        Ok(self.state().intents.get(id.as_str()).cloned())
    }

    async fn cancel_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<PaymentIntent, PaymentError> {
        self.record_call("cancel_payment_intent", vec![id.to_string()]);
        self.check_error("cancel_payment_intent")?;

        let mut state = self.state();
        let intent = state
            .intents
            .get_mut(id.as_str())
            .ok_or_else(|| PaymentError::not_found("PaymentIntent"))?;
        if intent.status.is_awaitable() {
            intent.status = PaymentIntentStatus::Canceled;
        } else if intent.status != PaymentIntentStatus::Canceled {
            return Err(PaymentError::provider(format!(
                "You cannot cancel this PaymentIntent because it has a status of {}",
                intent.status.as_str()
            )));
        }
        Ok(intent.clone())
    }

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        self.record_call(
            "create_customer",
            vec![request.user_id.to_string(), request.idempotency_key.clone()],
        );
        self.check_error("create_customer")?;

        let mut state = self.state();
        if let Some(id) = idempotent_lookup(&state, "create_customer", &request.idempotency_key) {
            if let Some(customer) = state.customers.get(&id) {
                return Ok(customer.clone());
            }
        }

        let id = short_id("cus");
        let mut metadata = BTreeMap::new();
        metadata.insert("userId".to_string(), request.user_id.to_string());
        let customer = Customer {
            id: CustomerId::new(id.clone()).map_err(|e| PaymentError::provider(e.to_string()))?,
            email: request.email,
            default_payment_method: None,
            metadata,
        };
        state.idempotency.insert(
            ("create_customer".to_string(), request.idempotency_key),
            id.clone(),
        );
        state.customers.insert(id, customer.clone());
        Ok(customer)
    }

    async fn retrieve_customer(&self, id: &CustomerId) -> Result<Option<Customer>, PaymentError> {
        self.record_call("retrieve_customer", vec![id.to_string()]);
        self.check_error("retrieve_customer")?;
        Ok(self.state().customers.get(id.as_str()).cloned())
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &CustomerId,
        payment_method_id: &str,
    ) -> Result<Customer, PaymentError> {
        self.record_call(
            "set_default_payment_method",
            vec![customer_id.to_string(), payment_method_id.to_string()],
        );
        self.check_error("set_default_payment_method")?;

        let mut state = self.state();
        let customer = state
            .customers
            .get_mut(customer_id.as_str())
            .ok_or_else(|| PaymentError::not_found("Customer"))?;
        customer.default_payment_method = Some(payment_method_id.to_string());
        Ok(customer.clone())
    }

    async fn list_payment_methods(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<PaymentMethod>, PaymentError> {
        self.record_call("list_payment_methods", vec![customer_id.to_string()]);
        self.check_error("list_payment_methods")?;
        Ok(self
            .state()
            .payment_methods
            .get(customer_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn list_subscriptions(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<Subscription>, PaymentError> {
        self.record_call(
            "list_subscriptions",
            vec![customer_id.to_string(), limit.to_string()],
        );
        self.check_error("list_subscriptions")?;
        Ok(self
            .state()
            .subscriptions
            .iter()
            .rev()
            .filter(|s| &s.customer_id == customer_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn retrieve_subscription(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, PaymentError> {
        self.record_call("retrieve_subscription", vec![id.to_string()]);
        self.check_error("retrieve_subscription")?;
        Ok(self
            .state()
            .subscriptions
            .iter()
            .find(|s| &s.id == id)
            .cloned())
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<Subscription, PaymentError> {
        self.record_call(
            "create_subscription",
            vec![
                request.customer_id.to_string(),
                request.price_id.clone(),
                request.idempotency_key.clone(),
            ],
        );
        self.check_error("create_subscription")?;

        let mut state = self.state();
        if let Some(id) = idempotent_lookup(&state, "create_subscription", &request.idempotency_key) {
            if let Some(sub) = state.subscriptions.iter().find(|s| s.id.as_str() == id) {
                return Ok(sub.clone());
            }
        }

        let now = chrono::Utc::now().timestamp();
        let period_end = now + state.subscription_period_secs.unwrap_or(DEFAULT_PERIOD_SECS);
        let id = short_id("sub");
        let pi_id = short_id("pi");
        let client_secret = format!("{}_secret_{}", pi_id, &short_id("cs")[8..]);
        let invoice = LatestInvoice {
            id: short_id("in"),
            amount_due: 0,
            currency: "mxn".to_string(),
            period_end: Some(period_end),
            payment_intent_id: Some(
                PaymentIntentId::new(pi_id.clone()).map_err(|e| PaymentError::provider(e.to_string()))?,
            ),
            client_secret: Some(client_secret.clone()),
        };
        let subscription = Subscription {
            id: SubscriptionId::new(id.clone()).map_err(|e| PaymentError::provider(e.to_string()))?,
            customer_id: request.customer_id,
            status: SubscriptionState::Incomplete,
            price_id: Some(request.price_id),
            current_period_end: Some(period_end),
            cancel_at_period_end: false,
            metadata: request.metadata.clone(),
            latest_invoice: Some(invoice),
        };

        state.intents.insert(
            pi_id.clone(),
            PaymentIntent {
                id: PaymentIntentId::new(pi_id).map_err(|e| PaymentError::provider(e.to_string()))?,
                client_secret: Some(client_secret),
                amount: 0,
                currency: "mxn".to_string(),
                status: PaymentIntentStatus::RequiresPaymentMethod,
                metadata: BTreeMap::new(),
            },
        );
        state.idempotency.insert(
            ("create_subscription".to_string(), request.idempotency_key),
            id,
        );
        state.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn cancel_subscription(
        &self,
        id: &SubscriptionId,
        at_period_end: bool,
    ) -> Result<Subscription, PaymentError> {
        self.record_call(
            "cancel_subscription",
            vec![id.to_string(), at_period_end.to_string()],
        );
        self.check_error("cancel_subscription")?;

        let mut state = self.state();
        let subscription = state
            .subscriptions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| PaymentError::not_found("Subscription"))?;

        if at_period_end {
            subscription.cancel_at_period_end = true;
        } else {
            subscription.status = SubscriptionState::Canceled;
        }
        Ok(subscription.clone())
    }

    async fn list_invoices(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<Invoice>, PaymentError> {
        self.record_call(
            "list_invoices",
            vec![customer_id.to_string(), limit.to_string()],
        );
        self.check_error("list_invoices")?;
        let state = self.state();
        let mut invoices = state
            .invoices
            .get(customer_id.as_str())
            .cloned()
            .unwrap_or_default();
        invoices.sort_by(|a, b| b.created.cmp(&a.created));
        invoices.truncate(limit as usize);
        Ok(invoices)
    }

    async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund, PaymentError> {
        self.record_call(
            "create_refund",
            vec![
                request.payment_intent_id.to_string(),
                request.reason.clone(),
                request.idempotency_key.clone(),
            ],
        );
        self.check_error("create_refund")?;

        let mut state = self.state();
        if let Some(id) = idempotent_lookup(&state, "create_refund", &request.idempotency_key) {
            if let Some(refund) = state.refunds.iter().find(|r| r.id == id) {
                return Ok(refund.clone());
            }
        }

        let refund = Refund {
            id: short_id("re"),
            status: "succeeded".to_string(),
            payment_intent_id: request.payment_intent_id,
        };
        state.idempotency.insert(
            ("create_refund".to_string(), request.idempotency_key),
            refund.id.clone(),
        );
        state.refunds.push(refund.clone());
        Ok(refund)
    }
}
