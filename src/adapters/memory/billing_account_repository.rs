//! In-memory billing account store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{CustomerId, DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::subscription::{BillingAccount, PremiumStatus};
use crate::ports::BillingAccountRepository;

#[derive(Default)]
pub struct InMemoryBillingAccountRepository {
    accounts: RwLock<HashMap<UserId, BillingAccount>>,
}

impl InMemoryBillingAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, account: BillingAccount) {
        self.accounts
            .write()
            .await
            .insert(account.user_id.clone(), account);
    }

    pub async fn get(&self, user_id: &UserId) -> Option<BillingAccount> {
        self.accounts.read().await.get(user_id).cloned()
    }
}

#[async_trait]
impl BillingAccountRepository for InMemoryBillingAccountRepository {
    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<BillingAccount>, DomainError> {
        Ok(self.get(user_id).await)
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<BillingAccount>, DomainError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.customer_id.as_ref() == Some(customer_id))
            .cloned())
    }

    async fn assign_customer_id(
        &self,
        user_id: &UserId,
        customer_id: &CustomerId,
    ) -> Result<CustomerId, DomainError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(user_id).ok_or_else(|| {
            DomainError::new(ErrorCode::UserNotFound, format!("User not found: {}", user_id))
        })?;
        Ok(account
            .customer_id
            .get_or_insert_with(|| customer_id.clone())
            .clone())
    }

    async fn set_premium(
        &self,
        user_id: &UserId,
        premium: &PremiumStatus,
    ) -> Result<bool, DomainError> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(user_id) {
            Some(account) => {
                account.premium = *premium;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn expire_premium(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut accounts = self.accounts.write().await;
        let mut expired = 0;
        for account in accounts.values_mut() {
            let lapsed = account.premium.is_premium
                && account
                    .premium
                    .premium_until
                    .is_some_and(|until| until.is_before(&cutoff));
            if lapsed {
                account.premium = PremiumStatus::free();
                expired += 1;
            }
        }
        Ok(expired)
    }
}
