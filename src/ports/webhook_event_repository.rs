//! WebhookEventRepository port - processed webhook events.
//!
//! Each verified event id is stored with the outcome of handling it, so a
//! redelivery of an applied or ignored event is answered without touching
//! state again. Failed events stay eligible for reprocessing.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::webhook::{OutcomeKind, WebhookOutcome};

/// Record of a processed webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEventRecord {
    /// Processor event ID (evt_xxx format).
    pub event_id: String,
    pub event_type: String,
    pub outcome: OutcomeKind,
    pub detail: String,
    pub processed_at: Timestamp,
    /// Original event payload for debugging.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        outcome: &WebhookOutcome,
        payload: serde_json::Value,
        processed_at: Timestamp,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            outcome: outcome.kind(),
            detail: outcome.detail().to_string(),
            processed_at,
            payload,
        }
    }
}

/// Result of attempting to save a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Record stored (new event, or replaced a failed attempt).
    Inserted,
    /// A final record already exists (concurrent duplicate delivery).
    AlreadyExists,
}

/// Port for storing and retrieving processed webhook events.
///
/// Implementations use a primary key on `event_id` so concurrent deliveries
/// race on the insert, not on a read.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Find a previously processed event by its ID.
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Save a record.
    ///
    /// Inserts when absent and replaces an existing `failed` record. Returns
    /// `AlreadyExists` when an applied or ignored record is already stored.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Delete records processed before `cutoff`. Returns the number deleted.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}
