//! Billing handlers.
//!
//! ## Commands
//! - Requesting a listing boost (payment intent)
//! - Requesting, cancelling and re-synchronizing premium
//! - Sweeping expired promotions and premium
//!
//! ## Queries
//! - Boost status of a listing
//! - Premium status of a user

mod cancel_premium;
mod get_boost_status;
mod get_premium_status;
mod request_boost;
mod request_premium;
mod sweep_expired;
mod sync_premium;

// Commands
pub use cancel_premium::{CancelPremiumCommand, CancelPremiumHandler, CancelPremiumResult};
pub use request_boost::{
    RequestBoostCommand, RequestBoostHandler, RequestBoostResult,
    DEFAULT_FRESHNESS_WINDOW_MINUTES, META_LISTING_ID, META_USER_ID,
};
pub use request_premium::{
    RequestPremiumCommand, RequestPremiumHandler, RequestPremiumResult, META_SUBSCRIPTION_ID,
    META_TYPE, PREMIUM_TYPE,
};
pub use sweep_expired::{SweepExpiredHandler, SweepReport, DEFAULT_WEBHOOK_RETENTION_DAYS};
pub use sync_premium::{SyncPremiumCommand, SyncPremiumHandler, SyncPremiumResult};

// Queries
pub use get_boost_status::{
    BoostPaymentSummary, GetBoostStatusHandler, GetBoostStatusQuery, GetBoostStatusResult,
};
pub use get_premium_status::{
    GetPremiumStatusHandler, GetPremiumStatusQuery, GetPremiumStatusResult, SubscriptionView,
};
