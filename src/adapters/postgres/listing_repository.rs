//! PostgreSQL implementation of ListingRepository.
//!
//! Only the promotion columns of `listings` are written here; the rest of the
//! listing belongs to the catalog service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::database_error;
use crate::domain::foundation::{
    DomainError, ErrorCode, ListingId, PaymentIntentId, Timestamp, UserId,
};
use crate::domain::promotion::{BoostPlanId, Listing, Promotion};
use crate::ports::{ListingRepository, PromotionWrite};

pub struct PostgresListingRepository {
    pool: PgPool,
}

impl PostgresListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    owner_id: String,
    is_promoted: bool,
    promoted_until: Option<DateTime<Utc>>,
    promotion_plan: Option<String>,
    promotion_payment_intent_id: Option<String>,
}

impl TryFrom<ListingRow> for Listing {
    type Error = DomainError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        let plan = row
            .promotion_plan
            .as_deref()
            .map(str::parse::<BoostPlanId>)
            .transpose()
            .map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid promotion_plan: {}", e))
            })?;
        let paid_by = row
            .promotion_payment_intent_id
            .map(PaymentIntentId::new)
            .transpose()
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Invalid promotion_payment_intent_id: {}", e),
                )
            })?;
        Ok(Listing {
            id: ListingId::from_uuid(row.id),
            owner_id: UserId::new(row.owner_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid owner_id: {}", e))
            })?,
            promotion: Promotion {
                is_promoted: row.is_promoted,
                promoted_until: row.promoted_until.map(Timestamp::from_datetime),
                plan,
                paid_by,
            },
        })
    }
}

#[async_trait]
impl ListingRepository for PostgresListingRepository {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, DomainError> {
        let row: Option<ListingRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, is_promoted, promoted_until, promotion_plan,
                   promotion_payment_intent_id
            FROM listings
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("find listing", e))?;

        row.map(Listing::try_from).transpose()
    }

    async fn set_promotion(
        &self,
        id: &ListingId,
        promotion: &Promotion,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE listings SET
                is_promoted = $2,
                promoted_until = $3,
                promotion_plan = $4,
                promotion_payment_intent_id = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(promotion.is_promoted)
        .bind(promotion.promoted_until.map(|t| *t.as_datetime()))
        .bind(promotion.plan.map(|p| p.as_str()))
        .bind(promotion.paid_by.as_ref().map(|p| p.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("set promotion", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn activate_promotion(
        &self,
        id: &ListingId,
        promotion: &Promotion,
        now: Timestamp,
    ) -> Result<PromotionWrite, DomainError> {
        // A NULL payment id never matches, so unmarked promotions only
        // replace promotions that are no longer running.
        let result = sqlx::query(
            r#"
            UPDATE listings SET
                is_promoted = $2,
                promoted_until = $3,
                promotion_plan = $4,
                promotion_payment_intent_id = $5,
                updated_at = NOW()
            WHERE id = $1
              AND (NOT is_promoted
                   OR promoted_until IS NULL
                   OR promoted_until <= $6
                   OR promotion_payment_intent_id = $5)
            "#,
        )
        .bind(id.as_uuid())
        .bind(promotion.is_promoted)
        .bind(promotion.promoted_until.map(|t| *t.as_datetime()))
        .bind(promotion.plan.map(|p| p.as_str()))
        .bind(promotion.paid_by.as_ref().map(|p| p.as_str()))
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("activate promotion", e))?;

        if result.rows_affected() > 0 {
            return Ok(PromotionWrite::Applied);
        }
        Ok(match self.find_by_id(id).await? {
            Some(listing) => PromotionWrite::Rejected(listing.promotion),
            None => PromotionWrite::NotFound,
        })
    }

    async fn expire_promotions(&self, now: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE listings SET
                is_promoted = FALSE,
                promoted_until = NULL,
                promotion_plan = NULL,
                promotion_payment_intent_id = NULL,
                updated_at = NOW()
            WHERE is_promoted
              AND (promoted_until IS NULL OR promoted_until <= $1)
            "#,
        )
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("expire promotions", e))?;

        Ok(result.rows_affected())
    }
}
