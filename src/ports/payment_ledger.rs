//! Payment ledger port.
//!
//! The ledger is the only store with "create if absent, else reuse"
//! semantics. Uniqueness of `payment_intent_id`, and of the one pending boost
//! a listing may have, must be enforced by the store itself, since several
//! service instances may insert concurrently.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ListingId, PaymentIntentId, UserId};
use crate::domain::ledger::{LedgerEntry, PaymentKind};

/// Result of a conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerInsert {
    Inserted,
    /// The entry that blocked the insert, unchanged: the one for the same
    /// payment intent, or the listing's pending boost.
    Existing(LedgerEntry),
}

#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Insert `entry` unless one with the same payment intent id exists, or
    /// `entry` is a pending boost and its listing already has one.
    async fn insert_if_absent(&self, entry: &LedgerEntry) -> Result<LedgerInsert, DomainError>;

    async fn find_by_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<Option<LedgerEntry>, DomainError>;

    /// The `pending` boost entry of a listing, whatever its plan or age.
    async fn find_pending_boost(
        &self,
        listing_id: &ListingId,
    ) -> Result<Option<LedgerEntry>, DomainError>;

    /// Number of entries of one kind ever recorded for a listing.
    async fn count_for_listing(
        &self,
        listing_id: &ListingId,
        kind: PaymentKind,
    ) -> Result<u64, DomainError>;

    /// Persist a settled status, only while the stored entry is still `pending`.
    ///
    /// Returns `false` if the entry was missing or already settled.
    async fn update_status(&self, entry: &LedgerEntry) -> Result<bool, DomainError>;

    /// Entries of one kind for a listing, newest first.
    async fn recent_for_listing(
        &self,
        listing_id: &ListingId,
        kind: PaymentKind,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, DomainError>;

    /// Entries of a user, newest first.
    async fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, DomainError>;
}
