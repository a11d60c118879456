//! Billing error taxonomy.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | ValidationFailed, InvalidPlan | 400 |
//! | PaymentMethodRequired | 402 |
//! | Forbidden | 403 |
//! | ListingNotFound, UserNotFound, NoActiveSubscription | 404 |
//! | AlreadyPromoted, DuplicatePayment, PaymentInProgress | 409 |
//! | Upstream, Infrastructure | 500 |

use crate::domain::foundation::{
    DomainError, ErrorCode, ListingId, PaymentIntentId, Timestamp, UserId, ValidationError,
};
use crate::domain::promotion::{BoostPlanId, RemainingTime};
use crate::ports::PaymentError;

/// Errors returned by boost and premium operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    ListingNotFound(ListingId),

    UserNotFound(UserId),

    /// The caller does not own the listing.
    Forbidden(String),

    InvalidPlan {
        requested: String,
        available: Vec<String>,
    },

    /// The listing is still promoted; carries what the client needs to render it.
    AlreadyPromoted {
        promoted_until: Timestamp,
        remaining: RemainingTime,
    },

    /// A payment for this request already completed and is awaiting activation.
    DuplicatePayment(PaymentIntentId),

    /// Another boost payment for the listing is still open.
    PaymentInProgress {
        payment_intent_id: PaymentIntentId,
        plan: Option<BoostPlanId>,
    },

    /// No default payment method; the client must run the setup-intent flow first.
    PaymentMethodRequired,

    NoActiveSubscription(UserId),

    ValidationFailed {
        field: String,
        message: String,
    },

    /// The payment processor call failed.
    Upstream(String),

    Infrastructure(String),
}

impl BillingError {
    pub fn listing_not_found(id: ListingId) -> Self {
        BillingError::ListingNotFound(id)
    }

    pub fn user_not_found(id: UserId) -> Self {
        BillingError::UserNotFound(id)
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        BillingError::Forbidden(reason.into())
    }

    pub fn invalid_plan(requested: impl Into<String>, available: Vec<&str>) -> Self {
        BillingError::InvalidPlan {
            requested: requested.into(),
            available: available.into_iter().map(String::from).collect(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        BillingError::Upstream(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::ListingNotFound(_) => ErrorCode::ListingNotFound,
            BillingError::UserNotFound(_) => ErrorCode::UserNotFound,
            BillingError::Forbidden(_) => ErrorCode::Forbidden,
            BillingError::InvalidPlan { .. } => ErrorCode::InvalidPlan,
            BillingError::AlreadyPromoted { .. } => ErrorCode::AlreadyPromoted,
            BillingError::DuplicatePayment(_) => ErrorCode::DuplicatePayment,
            BillingError::PaymentInProgress { .. } => ErrorCode::PaymentInProgress,
            BillingError::PaymentMethodRequired => ErrorCode::PaymentMethodRequired,
            BillingError::NoActiveSubscription(_) => ErrorCode::SubscriptionNotFound,
            BillingError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            BillingError::Upstream(_) => ErrorCode::PaymentProviderError,
            BillingError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-facing message explaining the rejection.
    pub fn message(&self) -> String {
        match self {
            BillingError::ListingNotFound(id) => format!("Listing not found: {}", id),
            BillingError::UserNotFound(id) => format!("User not found: {}", id),
            BillingError::Forbidden(reason) => reason.clone(),
            BillingError::InvalidPlan {
                requested,
                available,
            } => format!(
                "Unknown boost plan '{}'. Available plans: {}",
                requested,
                available.join(", ")
            ),
            BillingError::AlreadyPromoted { remaining, .. } => format!(
                "Listing is already promoted for another {}h {}m",
                remaining.hours, remaining.minutes
            ),
            BillingError::DuplicatePayment(id) => format!(
                "Payment {} already completed; the promotion will activate shortly",
                id
            ),
            BillingError::PaymentInProgress { plan, .. } => match plan {
                Some(plan) => format!(
                    "A {} boost payment for this listing is already in progress; complete it or try again later",
                    plan
                ),
                None => "A boost payment for this listing is already in progress".to_string(),
            },
            BillingError::PaymentMethodRequired => {
                "A default payment method is required. Add one through the setup flow first"
                    .to_string()
            }
            BillingError::NoActiveSubscription(user_id) => {
                format!("No active subscription for user: {}", user_id)
            }
            BillingError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            BillingError::Upstream(msg) => format!("Payment processor error: {}", msg),
            BillingError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Errors whose details should not leave the service outside development.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            BillingError::Upstream(_) | BillingError::Infrastructure(_)
        )
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => BillingError::ValidationFailed {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            ErrorCode::PaymentProviderError => BillingError::Upstream(err.message),
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyField { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field.clone(),
        };
        BillingError::ValidationFailed {
            field,
            message: err.to_string(),
        }
    }
}

impl From<PaymentError> for BillingError {
    fn from(err: PaymentError) -> Self {
        BillingError::Upstream(err.to_string())
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}
