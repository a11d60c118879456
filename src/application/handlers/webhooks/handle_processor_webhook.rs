//! HandleProcessorWebhookHandler - verifies a raw delivery and reconciles it.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::foundation::Timestamp;
use crate::domain::webhook::{
    IdempotentWebhookProcessor, WebhookError, WebhookOutcome, WebhookVerifier,
};

/// Command carrying one webhook delivery exactly as received.
#[derive(Debug, Clone)]
pub struct HandleProcessorWebhookCommand {
    /// Raw request body; the signature covers these exact bytes.
    pub payload: Vec<u8>,
    /// Signature header, absent if the request carried none.
    pub signature: Option<String>,
}

/// Result of reconciling one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleProcessorWebhookResult {
    pub event_id: String,
    pub event_type: String,
    pub outcome: WebhookOutcome,
    pub duplicate: bool,
}

/// Handler for processor webhook deliveries.
///
/// Rejects anything whose signature does not verify, then hands the event to
/// the idempotent processor. Handler failures are recorded, not returned, so
/// the caller acknowledges the delivery either way.
pub struct HandleProcessorWebhookHandler {
    verifier: WebhookVerifier,
    processor: Arc<IdempotentWebhookProcessor>,
    require_livemode: bool,
}

impl HandleProcessorWebhookHandler {
    pub fn new(verifier: WebhookVerifier, processor: Arc<IdempotentWebhookProcessor>) -> Self {
        Self {
            verifier,
            processor,
            require_livemode: false,
        }
    }

    /// Acknowledges test-mode events without applying them.
    pub fn with_require_livemode(mut self, require_livemode: bool) -> Self {
        self.require_livemode = require_livemode;
        self
    }

    pub async fn handle(
        &self,
        cmd: HandleProcessorWebhookCommand,
    ) -> Result<HandleProcessorWebhookResult, WebhookError> {
        self.handle_at(cmd, Timestamp::now()).await
    }

    pub async fn handle_at(
        &self,
        cmd: HandleProcessorWebhookCommand,
        now: Timestamp,
    ) -> Result<HandleProcessorWebhookResult, WebhookError> {
        // 1. Verify before reading anything from the payload
        let signature = cmd.signature.as_deref().unwrap_or_default();
        let event = self
            .verifier
            .verify_and_parse_at(&cmd.payload, signature, now.as_unix_secs())
            .inspect_err(|e| warn!(error = %e, "Rejected webhook delivery"))?;

        let event_id = event.id.clone();
        let event_type = event.event_type.clone();

        // 2. Test-mode events never touch live state
        if self.require_livemode && !event.livemode {
            info!(event_id = %event_id, event_type = %event_type, "Skipped test-mode webhook");
            return Ok(HandleProcessorWebhookResult {
                event_id,
                event_type,
                outcome: WebhookOutcome::ignored("test-mode event"),
                duplicate: false,
            });
        }

        // 3. Reconcile exactly once
        let result = self.processor.process_at(event, now).await?;

        Ok(HandleProcessorWebhookResult {
            event_id,
            event_type,
            outcome: result.outcome,
            duplicate: result.duplicate,
        })
    }
}
