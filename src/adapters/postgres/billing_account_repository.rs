//! PostgreSQL implementation of BillingAccountRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::database_error;
use crate::domain::foundation::{CustomerId, DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::subscription::{BillingAccount, PremiumStatus};
use crate::ports::BillingAccountRepository;

pub struct PostgresBillingAccountRepository {
    pool: PgPool,
}

impl PostgresBillingAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    user_id: String,
    email: Option<String>,
    customer_id: Option<String>,
    is_premium: bool,
    premium_until: Option<DateTime<Utc>>,
}

impl TryFrom<AccountRow> for BillingAccount {
    type Error = DomainError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let user_id = UserId::new(row.user_id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
        })?;
        // Blank customer ids are treated as unset.
        let customer_id = row.customer_id.and_then(|id| CustomerId::new(id).ok());
        Ok(BillingAccount {
            user_id,
            email: row.email,
            customer_id,
            premium: PremiumStatus {
                is_premium: row.is_premium,
                premium_until: row.premium_until.map(Timestamp::from_datetime),
            },
        })
    }
}

const SELECT_ACCOUNT: &str = r#"
    SELECT user_id, email, customer_id, is_premium, premium_until
    FROM billing_accounts
"#;

#[async_trait]
impl BillingAccountRepository for PostgresBillingAccountRepository {
    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<BillingAccount>, DomainError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("{} WHERE user_id = $1", SELECT_ACCOUNT))
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| database_error("find billing account", e))?;

        row.map(BillingAccount::try_from).transpose()
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<BillingAccount>, DomainError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("{} WHERE customer_id = $1", SELECT_ACCOUNT))
                .bind(customer_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| database_error("find billing account by customer", e))?;

        row.map(BillingAccount::try_from).transpose()
    }

    async fn assign_customer_id(
        &self,
        user_id: &UserId,
        customer_id: &CustomerId,
    ) -> Result<CustomerId, DomainError> {
        // COALESCE keeps a customer stored by a concurrent request.
        let stored: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE billing_accounts SET
                customer_id = COALESCE(customer_id, $2),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING customer_id
            "#,
        )
        .bind(user_id.as_str())
        .bind(customer_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("assign customer id", e))?;

        match stored {
            Some((Some(id),)) => CustomerId::new(id).map_err(DomainError::from),
            Some((None,)) => Ok(customer_id.clone()),
            None => Err(DomainError::new(
                ErrorCode::UserNotFound,
                format!("User not found: {}", user_id),
            )),
        }
    }

    async fn set_premium(
        &self,
        user_id: &UserId,
        premium: &PremiumStatus,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE billing_accounts SET
                is_premium = $2,
                premium_until = $3,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .bind(premium.is_premium)
        .bind(premium.premium_until.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("set premium", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn expire_premium(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE billing_accounts SET
                is_premium = FALSE,
                premium_until = NULL,
                updated_at = NOW()
            WHERE is_premium
              AND premium_until < $1
            "#,
        )
        .bind(cutoff.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("expire premium", e))?;

        Ok(result.rows_affected())
    }
}
