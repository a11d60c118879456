//! Webhook error types.
//!
//! Each variant maps to an HTTP status and tells whether the processor
//! should redeliver.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ValidationError};
use crate::ports::PaymentError;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature header absent from the request.
    #[error("Missing signature header")]
    MissingSignature,

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required metadata field missing from webhook event.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// Metadata present but unusable.
    #[error("Invalid metadata {field}: {reason}")]
    InvalidMetadata { field: &'static str, reason: String },

    /// Required field missing from webhook payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Referenced listing or user could not be found.
    #[error("{0} not found")]
    NotFound(String),

    /// Attempted state transition is not valid.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Outbound processor call failed.
    #[error("Processor error: {0}")]
    Processor(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Verification failures: the request is rejected before any state is read.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature
                | WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
        )
    }

    /// Returns true if the processor should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Database(_) | WebhookError::Processor(_)
        )
    }

    /// Maps the error to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp => StatusCode::UNAUTHORIZED,

            WebhookError::ParseError(_)
            | WebhookError::MissingMetadata(_)
            | WebhookError::InvalidMetadata { .. }
            | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            WebhookError::NotFound(_) => StatusCode::NOT_FOUND,

            WebhookError::InvalidTransition(_)
            | WebhookError::Processor(_)
            | WebhookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}

impl From<ValidationError> for WebhookError {
    fn from(err: ValidationError) -> Self {
        WebhookError::InvalidTransition(err.to_string())
    }
}

impl From<PaymentError> for WebhookError {
    fn from(err: PaymentError) -> Self {
        WebhookError::Processor(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;

    #[test]
    fn verification_failures_map_to_unauthorized() {
        for err in [
            WebhookError::MissingSignature,
            WebhookError::InvalidSignature,
            WebhookError::TimestampOutOfRange,
            WebhookError::InvalidTimestamp,
        ] {
            assert!(err.is_authentication_failure());
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn payload_problems_map_to_bad_request() {
        assert_eq!(
            WebhookError::ParseError("bad json".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::MissingMetadata("listingId").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn infrastructure_errors_are_retryable() {
        assert!(WebhookError::Database("down".to_string()).is_retryable());
        assert!(WebhookError::Processor("timeout".to_string()).is_retryable());
        assert!(!WebhookError::NotFound("Listing".to_string()).is_retryable());
    }

    #[test]
    fn messages_render_context() {
        assert_eq!(
            WebhookError::MissingMetadata("planId").to_string(),
            "Missing metadata: planId"
        );
        assert_eq!(
            WebhookError::InvalidMetadata {
                field: "planId",
                reason: "unknown plan".to_string()
            }
            .to_string(),
            "Invalid metadata planId: unknown plan"
        );
        assert_eq!(
            WebhookError::NotFound("Listing".to_string()).to_string(),
            "Listing not found"
        );
    }

    #[test]
    fn domain_error_converts_to_database_error() {
        let err: WebhookError = DomainError::new(ErrorCode::DatabaseError, "pool closed").into();
        assert!(matches!(err, WebhookError::Database(msg) if msg.contains("pool closed")));
    }
}
