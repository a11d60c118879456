//! Billing account repository port.

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, DomainError, Timestamp, UserId};
use crate::domain::subscription::{BillingAccount, PremiumStatus};

/// Repository port for the billing fields of users.
#[async_trait]
pub trait BillingAccountRepository: Send + Sync {
    /// Find an account by user ID. Returns `None` if the user is unknown.
    async fn find_by_user_id(&self, user_id: &UserId)
        -> Result<Option<BillingAccount>, DomainError>;

    /// Find the account owning a processor customer.
    async fn find_by_customer_id(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<BillingAccount>, DomainError>;

    /// Store `customer_id` unless the user already has one.
    ///
    /// Returns the customer id stored after the call, which is the existing
    /// one if another request got there first.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if the user does not exist
    async fn assign_customer_id(
        &self,
        user_id: &UserId,
        customer_id: &CustomerId,
    ) -> Result<CustomerId, DomainError>;

    /// Overwrite the premium fields. Returns `false` if the user does not exist.
    async fn set_premium(&self, user_id: &UserId, premium: &PremiumStatus)
        -> Result<bool, DomainError>;

    /// Reset every premium user whose `premium_until` is before `cutoff`,
    /// in one bulk update. Returns the number of users reset.
    async fn expire_premium(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_account_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn BillingAccountRepository) {}
    }
}
