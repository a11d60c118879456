//! Webhook processor - idempotent dispatch of verified events.
//!
//! The processor follows these steps:
//! 1. Check whether the event id already has a final record
//! 2. Dispatch to the handler registered for the event type
//! 3. Record the outcome (applied, ignored or failed)
//!
//! ## Race Condition Handling
//!
//! When two deliveries of the same event arrive simultaneously both may run
//! their handler. Handlers are idempotent by construction (targeted updates
//! with absolute values), and the store's primary key decides which record
//! is kept. The loser reports a duplicate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ProcessorEvent, ProcessorEventType, WebhookError, WebhookOutcome};
use crate::domain::foundation::Timestamp;
use crate::ports::{SaveResult, WebhookEventRecord, WebhookEventRepository};

/// Handler for one or more processor event types.
///
/// Implementations return a structured outcome instead of mutating a
/// response. `Err` is reserved for failures the handler could not turn into
/// an outcome itself; the processor records those as `failed`.
#[async_trait]
pub trait WebhookEventHandler: Send + Sync {
    /// Returns the event type(s) this handler processes.
    fn handles(&self) -> Vec<ProcessorEventType>;

    async fn handle(&self, event: &ProcessorEvent) -> Result<WebhookOutcome, WebhookError>;
}

/// Maps event types to their handlers.
#[derive(Default, Clone)]
pub struct WebhookRegistry {
    handlers: HashMap<ProcessorEventType, Arc<dyn WebhookEventHandler>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every type it declares. A later registration
    /// for the same type replaces the earlier one.
    pub fn register(mut self, handler: Arc<dyn WebhookEventHandler>) -> Self {
        for event_type in handler.handles() {
            self.handlers.insert(event_type, handler.clone());
        }
        self
    }

    pub fn get_handler(&self, event_type: &ProcessorEventType) -> Option<&dyn WebhookEventHandler> {
        self.handlers.get(event_type).map(|h| h.as_ref())
    }

    pub fn registered_types(&self) -> Vec<&ProcessorEventType> {
        self.handlers.keys().collect()
    }

    /// Dispatches an event to its handler. Unregistered types are ignored.
    pub async fn dispatch(&self, event: &ProcessorEvent) -> Result<WebhookOutcome, WebhookError> {
        let event_type = event.parsed_type();
        match self.get_handler(&event_type) {
            Some(handler) => handler.handle(event).await,
            None => Ok(WebhookOutcome::ignored(format!(
                "no handler for event type {}",
                event_type
            ))),
        }
    }
}

/// Result of processing one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub outcome: WebhookOutcome,
    /// The event had already been handled; nothing was applied this time.
    pub duplicate: bool,
}

/// Processes verified events with idempotency guarantees.
pub struct IdempotentWebhookProcessor {
    repository: Arc<dyn WebhookEventRepository>,
    registry: WebhookRegistry,
}

impl IdempotentWebhookProcessor {
    pub fn new(repository: Arc<dyn WebhookEventRepository>, registry: WebhookRegistry) -> Self {
        Self {
            repository,
            registry,
        }
    }

    pub async fn process(&self, event: ProcessorEvent) -> Result<ProcessResult, WebhookError> {
        self.process_at(event, Timestamp::now()).await
    }

    /// Processes an event, stamping the stored record with `now`.
    ///
    /// Idempotency-store failures and retryable handler errors are returned as
    /// `Err` and leave no record, so the processor redelivers the event.
    /// Other handler errors become a `failed` record.
    pub async fn process_at(
        &self,
        event: ProcessorEvent,
        now: Timestamp,
    ) -> Result<ProcessResult, WebhookError> {
        // 1. Short-circuit events that already reached a final outcome
        if let Some(existing) = self.repository.find_by_event_id(&event.id).await? {
            if existing.outcome.is_final() {
                debug!(event_id = %event.id, outcome = %existing.outcome, "Duplicate webhook delivery");
                return Ok(duplicate());
            }
            info!(event_id = %event.id, "Retrying previously failed webhook event");
        }

        // 2. Dispatch
        let outcome = match self.registry.dispatch(&event).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_retryable() => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Webhook handler failed; awaiting redelivery"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Webhook handler failed"
                );
                WebhookOutcome::failed(e.to_string())
            }
        };

        // 3. Record the outcome
        let payload = serde_json::to_value(&event)
            .map_err(|e| WebhookError::ParseError(format!("Failed to serialize event: {}", e)))?;
        let record = WebhookEventRecord::new(&event.id, &event.event_type, &outcome, payload, now);

        match self.repository.save(record).await? {
            SaveResult::Inserted => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    outcome = %outcome.kind(),
                    detail = outcome.detail(),
                    "Webhook event processed"
                );
                Ok(ProcessResult {
                    outcome,
                    duplicate: false,
                })
            }
            // Lost the race to a concurrent delivery
            SaveResult::AlreadyExists => Ok(duplicate()),
        }
    }
}

fn duplicate() -> ProcessResult {
    ProcessResult {
        outcome: WebhookOutcome::ignored("duplicate"),
        duplicate: true,
    }
}
