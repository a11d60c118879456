//! Result of handling one webhook event.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a handler did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// State changed, or was already in the target state.
    Applied(String),
    /// Nothing to do for this event.
    Ignored(String),
    /// The event could not be applied. Compensation, if any, already ran.
    Failed(String),
}

impl WebhookOutcome {
    pub fn applied(detail: impl Into<String>) -> Self {
        WebhookOutcome::Applied(detail.into())
    }

    pub fn ignored(reason: impl Into<String>) -> Self {
        WebhookOutcome::Ignored(reason.into())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        WebhookOutcome::Failed(reason.into())
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            WebhookOutcome::Applied(_) => OutcomeKind::Applied,
            WebhookOutcome::Ignored(_) => OutcomeKind::Ignored,
            WebhookOutcome::Failed(_) => OutcomeKind::Failed,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            WebhookOutcome::Applied(s) | WebhookOutcome::Ignored(s) | WebhookOutcome::Failed(s) => s,
        }
    }
}

/// Outcome without its detail, as stored in the processed-event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Applied,
    Ignored,
    Failed,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Applied => "applied",
            OutcomeKind::Ignored => "ignored",
            OutcomeKind::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "applied" => Some(OutcomeKind::Applied),
            "ignored" => Some(OutcomeKind::Ignored),
            "failed" => Some(OutcomeKind::Failed),
            _ => None,
        }
    }

    /// Failed events may be processed again on redelivery.
    pub fn is_final(&self) -> bool {
        !matches!(self, OutcomeKind::Failed)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
