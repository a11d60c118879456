//! Subscription module - per-user premium state.

mod account;
mod snapshot;
mod terms;

pub use account::{BillingAccount, PremiumStatus};
pub use snapshot::{
    apply_subscription_snapshot, PremiumUpdate, SubscriptionSnapshot, SubscriptionState,
    DEFAULT_FALLBACK_PERIOD_DAYS,
};
pub use terms::{PremiumTerms, DEFAULT_GRACE_PERIOD_DAYS};
