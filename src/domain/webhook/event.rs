//! Processor webhook events.
//!
//! Only the envelope is typed. Handlers read the fields they need from the
//! polymorphic `data.object`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A webhook event as delivered by the processor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessorEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    /// Type of event (e.g., "payment_intent.succeeded").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time at which the event was created (Unix timestamp).
    pub created: i64,

    pub data: EventData,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default)]
    pub api_version: Option<String>,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventData {
    /// The object that triggered the event.
    pub object: serde_json::Value,

    /// Previous values for updated attributes (only for update events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl ProcessorEvent {
    pub fn parsed_type(&self) -> ProcessorEventType {
        ProcessorEventType::parse(&self.event_type)
    }

    pub fn object(&self) -> &serde_json::Value {
        &self.data.object
    }

    /// `data.object.id`.
    pub fn object_id(&self) -> Option<&str> {
        self.str_field("id")
    }

    /// Top-level string field of `data.object`.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.data.object.get(name).and_then(|v| v.as_str())
    }

    /// Top-level integer field of `data.object`.
    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.data.object.get(name).and_then(|v| v.as_i64())
    }

    /// String entries of `data.object.metadata`. Non-string values are skipped.
    pub fn metadata(&self) -> HashMap<String, String> {
        self.data
            .object
            .get("metadata")
            .and_then(|m| m.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Attempts to deserialize the data object as the specified type.
    pub fn deserialize_object<T: serde::de::DeserializeOwned>(
        &self,
    ) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

/// Event types the reconciler routes on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProcessorEventType {
    PaymentIntentSucceeded,
    ChargeSucceeded,
    PaymentIntentCanceled,
    PaymentIntentPaymentFailed,
    InvoicePaid,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    SubscriptionUpdated,
    SubscriptionDeleted,
    Unknown(String),
}

impl ProcessorEventType {
    pub fn parse(s: &str) -> Self {
        match s {
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            "charge.succeeded" => Self::ChargeSucceeded,
            "payment_intent.canceled" => Self::PaymentIntentCanceled,
            "payment_intent.payment_failed" => Self::PaymentIntentPaymentFailed,
            "invoice.paid" => Self::InvoicePaid,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::ChargeSucceeded => "charge.succeeded",
            Self::PaymentIntentCanceled => "payment_intent.canceled",
            Self::PaymentIntentPaymentFailed => "payment_intent.payment_failed",
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for ProcessorEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for creating test ProcessorEvent instances.
#[cfg(test)]
pub struct ProcessorEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
    livemode: bool,
}

#[cfg(test)]
impl Default for ProcessorEventBuilder {
    fn default() -> Self {
        Self {
            id: "evt_test_123".to_string(),
            event_type: "payment_intent.succeeded".to_string(),
            created: chrono::Utc::now().timestamp(),
            object: serde_json::json!({}),
            livemode: false,
        }
    }
}

#[cfg(test)]
impl ProcessorEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn created(mut self, created: i64) -> Self {
        self.created = created;
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn build(self) -> ProcessorEvent {
        ProcessorEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            data: EventData {
                object: self.object,
                previous_attributes: None,
            },
            livemode: self.livemode,
            api_version: Some("2025-07-30.basil".to_string()),
        }
    }
}
