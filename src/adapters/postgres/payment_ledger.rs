//! PostgreSQL implementation of PaymentLedger.
//!
//! `payment_intent_id` carries a unique constraint and a partial unique index
//! allows one pending boost per listing, so concurrent inserts resolve in the
//! database rather than in the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::database_error;
use crate::domain::foundation::{
    DomainError, ErrorCode, LedgerEntryId, ListingId, PaymentIntentId, Timestamp, UserId,
};
use crate::domain::ledger::{LedgerEntry, LedgerStatus, PaymentKind};
use crate::ports::{LedgerInsert, PaymentLedger};

pub struct PostgresPaymentLedger {
    pool: PgPool,
}

impl PostgresPaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    payment_intent_id: String,
    user_id: String,
    listing_id: Option<Uuid>,
    amount: i64,
    currency: String,
    status: String,
    kind: String,
    error_message: Option<String>,
    metadata: Json<BTreeMap<String, String>>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Invalid {}: {}", field, err))
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DomainError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(row.id),
            payment_intent_id: PaymentIntentId::new(row.payment_intent_id)
                .map_err(|e| corrupt("payment_intent_id", e))?,
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            listing_id: row.listing_id.map(ListingId::from_uuid),
            amount: row.amount,
            currency: row.currency,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            kind: row.kind.parse().map_err(|e| corrupt("kind", e))?,
            error_message: row.error_message,
            metadata: row.metadata.0,
            created_at: Timestamp::from_datetime(row.created_at),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
        })
    }
}

const SELECT_ENTRY: &str = r#"
    SELECT id, payment_intent_id, user_id, listing_id, amount, currency, status, kind,
           error_message, metadata, created_at, completed_at
    FROM payment_ledger
"#;

fn into_entries(rows: Vec<LedgerRow>) -> Result<Vec<LedgerEntry>, DomainError> {
    rows.into_iter().map(LedgerEntry::try_from).collect()
}

#[async_trait]
impl PaymentLedger for PostgresPaymentLedger {
    async fn insert_if_absent(&self, entry: &LedgerEntry) -> Result<LedgerInsert, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_ledger (
                id, payment_intent_id, user_id, listing_id, amount, currency, status, kind,
                error_message, metadata, created_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.payment_intent_id.as_str())
        .bind(entry.user_id.as_str())
        .bind(entry.listing_id.map(|id| *id.as_uuid()))
        .bind(entry.amount)
        .bind(&entry.currency)
        .bind(entry.status.as_str())
        .bind(entry.kind.as_str())
        .bind(&entry.error_message)
        .bind(Json(&entry.metadata))
        .bind(entry.created_at.as_datetime())
        .bind(entry.completed_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("insert ledger entry", e))?;

        if result.rows_affected() > 0 {
            return Ok(LedgerInsert::Inserted);
        }

        let mut existing = self.find_by_payment_intent(&entry.payment_intent_id).await?;
        if existing.is_none() {
            if let Some(listing_id) = &entry.listing_id {
                existing = self.find_pending_boost(listing_id).await?;
            }
        }
        let existing = existing.ok_or_else(|| {
            DomainError::database(format!(
                "Ledger insert for {} conflicted but no row was found",
                entry.payment_intent_id
            ))
        })?;
        Ok(LedgerInsert::Existing(existing))
    }

    async fn find_by_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        let row: Option<LedgerRow> =
            sqlx::query_as(&format!("{} WHERE payment_intent_id = $1", SELECT_ENTRY))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| database_error("find ledger entry", e))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn find_pending_boost(
        &self,
        listing_id: &ListingId,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        let row: Option<LedgerRow> = sqlx::query_as(&format!(
            "{} WHERE listing_id = $1 AND kind = $2 AND status = $3",
            SELECT_ENTRY
        ))
        .bind(listing_id.as_uuid())
        .bind(PaymentKind::ListingBoost.as_str())
        .bind(LedgerStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("find pending boost", e))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn count_for_listing(
        &self,
        listing_id: &ListingId,
        kind: PaymentKind,
    ) -> Result<u64, DomainError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payment_ledger WHERE listing_id = $1 AND kind = $2",
        )
        .bind(listing_id.as_uuid())
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| database_error("count ledger entries for listing", e))?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn update_status(&self, entry: &LedgerEntry) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_ledger SET
                status = $2,
                error_message = $3,
                completed_at = $4
            WHERE payment_intent_id = $1
              AND status = $5
            "#,
        )
        .bind(entry.payment_intent_id.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.completed_at.map(|t| *t.as_datetime()))
        .bind(LedgerStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("update ledger status", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn recent_for_listing(
        &self,
        listing_id: &ListingId,
        kind: PaymentKind,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, DomainError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
            "{} WHERE listing_id = $1 AND kind = $2 ORDER BY created_at DESC LIMIT $3",
            SELECT_ENTRY
        ))
        .bind(listing_id.as_uuid())
        .bind(kind.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("list ledger entries for listing", e))?;

        into_entries(rows)
    }

    async fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, DomainError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
            "{} WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
            SELECT_ENTRY
        ))
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("list ledger entries for user", e))?;

        into_entries(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::META_PLAN_ID;

    fn row(status: &str, kind: &str) -> LedgerRow {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_PLAN_ID.to_string(), "24h".to_string());
        LedgerRow {
            id: Uuid::new_v4(),
            payment_intent_id: "pi_1".to_string(),
            user_id: "user-1".to_string(),
            listing_id: Some(Uuid::new_v4()),
            amount: 150,
            currency: "mxn".to_string(),
            status: status.to_string(),
            kind: kind.to_string(),
            error_message: None,
            metadata: Json(metadata),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn row_converts_to_entry() {
        let entry = LedgerEntry::try_from(row("pending", "listing_boost")).unwrap();

        assert_eq!(entry.status, LedgerStatus::Pending);
        assert_eq!(entry.kind, PaymentKind::ListingBoost);
        assert_eq!(entry.plan_id(), Some("24h"));
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let err = LedgerEntry::try_from(row("refunded", "listing_boost")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn unknown_kind_is_a_database_error() {
        let err = LedgerEntry::try_from(row("pending", "donation")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }
}
