//! In-memory payment ledger keyed by payment intent id.
//!
//! Both uniqueness checks of `insert_if_absent` run under one write lock.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ListingId, PaymentIntentId, UserId};
use crate::domain::ledger::{LedgerEntry, LedgerStatus, PaymentKind};
use crate::ports::{LedgerInsert, PaymentLedger};

#[derive(Default)]
pub struct InMemoryPaymentLedger {
    entries: RwLock<HashMap<PaymentIntentId, LedgerEntry>>,
}

impl InMemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn is_pending_boost_of(entry: &LedgerEntry, listing_id: &ListingId) -> bool {
    entry.kind == PaymentKind::ListingBoost
        && entry.status == LedgerStatus::Pending
        && entry.listing_id.as_ref() == Some(listing_id)
}

fn newest_first(mut entries: Vec<LedgerEntry>, limit: u32) -> Vec<LedgerEntry> {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries.truncate(limit as usize);
    entries
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn insert_if_absent(&self, entry: &LedgerEntry) -> Result<LedgerInsert, DomainError> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&entry.payment_intent_id) {
            return Ok(LedgerInsert::Existing(existing.clone()));
        }
        if let Some(listing_id) = entry.listing_id.filter(|id| is_pending_boost_of(entry, id)) {
            if let Some(pending) = entries.values().find(|e| is_pending_boost_of(e, &listing_id)) {
                return Ok(LedgerInsert::Existing(pending.clone()));
            }
        }
        entries.insert(entry.payment_intent_id.clone(), entry.clone());
        Ok(LedgerInsert::Inserted)
    }

    async fn find_by_payment_intent(
        &self,
        id: &PaymentIntentId,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn find_pending_boost(
        &self,
        listing_id: &ListingId,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .find(|e| is_pending_boost_of(e, listing_id))
            .cloned())
    }

    async fn count_for_listing(
        &self,
        listing_id: &ListingId,
        kind: PaymentKind,
    ) -> Result<u64, DomainError> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| e.kind == kind && e.listing_id.as_ref() == Some(listing_id))
            .count() as u64)
    }

    async fn update_status(&self, entry: &LedgerEntry) -> Result<bool, DomainError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&entry.payment_intent_id) {
            Some(stored) if stored.status == LedgerStatus::Pending => {
                stored.status = entry.status;
                stored.error_message = entry.error_message.clone();
                stored.completed_at = entry.completed_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn recent_for_listing(
        &self,
        listing_id: &ListingId,
        kind: PaymentKind,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, DomainError> {
        let entries = self.entries.read().await;
        let matching = entries
            .values()
            .filter(|e| e.kind == kind && e.listing_id.as_ref() == Some(listing_id))
            .cloned()
            .collect();
        Ok(newest_first(matching, limit))
    }

    async fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, DomainError> {
        let entries = self.entries.read().await;
        let matching = entries
            .values()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(matching, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;
    use crate::domain::ledger::{NewLedgerEntry, META_PLAN_ID};
    use crate::domain::promotion::BoostPlanId;
    use std::collections::BTreeMap;

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    fn boost_entry(intent: &str, listing: ListingId, plan: BoostPlanId, at: Timestamp) -> LedgerEntry {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_PLAN_ID.to_string(), plan.as_str().to_string());
        LedgerEntry::pending(
            NewLedgerEntry {
                payment_intent_id: PaymentIntentId::new(intent).unwrap(),
                user_id: UserId::new("owner").unwrap(),
                listing_id: Some(listing),
                amount: 150,
                currency: "mxn".to_string(),
                kind: PaymentKind::ListingBoost,
                metadata,
            },
            at,
        )
    }

    #[tokio::test]
    async fn insert_if_absent_returns_existing_entry() {
        let ledger = InMemoryPaymentLedger::new();
        let listing = ListingId::new();
        let first = boost_entry("pi_1", listing, BoostPlanId::Day, now());
        let second = boost_entry("pi_1", listing, BoostPlanId::Week, now());

        assert_eq!(ledger.insert_if_absent(&first).await.unwrap(), LedgerInsert::Inserted);
        assert_eq!(
            ledger.insert_if_absent(&second).await.unwrap(),
            LedgerInsert::Existing(first)
        );
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn listing_holds_one_pending_boost_across_plans() {
        let ledger = InMemoryPaymentLedger::new();
        let listing = ListingId::new();
        let day = boost_entry("pi_day", listing, BoostPlanId::Day, now());
        let week = boost_entry("pi_week", listing, BoostPlanId::Week, now());

        assert_eq!(ledger.insert_if_absent(&day).await.unwrap(), LedgerInsert::Inserted);
        assert_eq!(
            ledger.insert_if_absent(&week).await.unwrap(),
            LedgerInsert::Existing(day.clone())
        );
        assert_eq!(ledger.find_pending_boost(&listing).await.unwrap(), Some(day.clone()));

        // Once settled, the listing takes a new pending boost
        let mut settled = day;
        settled.settle(LedgerStatus::Canceled, None, now()).unwrap();
        ledger.update_status(&settled).await.unwrap();
        assert_eq!(ledger.insert_if_absent(&week).await.unwrap(), LedgerInsert::Inserted);
        assert_eq!(
            ledger.count_for_listing(&listing, PaymentKind::ListingBoost).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn other_listings_do_not_block_a_pending_boost() {
        let ledger = InMemoryPaymentLedger::new();
        let first = boost_entry("pi_a", ListingId::new(), BoostPlanId::Day, now());
        let second = boost_entry("pi_b", ListingId::new(), BoostPlanId::Day, now());

        ledger.insert_if_absent(&first).await.unwrap();

        assert_eq!(ledger.insert_if_absent(&second).await.unwrap(), LedgerInsert::Inserted);
    }

    #[tokio::test]
    async fn update_status_only_applies_to_pending_entries() {
        let ledger = InMemoryPaymentLedger::new();
        let mut entry = boost_entry("pi_1", ListingId::new(), BoostPlanId::Day, now());
        ledger.insert_if_absent(&entry).await.unwrap();

        entry.settle(LedgerStatus::Succeeded, None, now()).unwrap();
        assert!(ledger.update_status(&entry).await.unwrap());

        let mut late = entry.clone();
        late.status = LedgerStatus::Canceled;
        assert!(!ledger.update_status(&late).await.unwrap());

        let stored = ledger
            .find_by_payment_intent(&entry.payment_intent_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, LedgerStatus::Succeeded);
    }

    #[tokio::test]
    async fn recent_for_listing_is_newest_first_and_limited() {
        let ledger = InMemoryPaymentLedger::new();
        let listing = ListingId::new();
        for i in 0..7 {
            let mut entry = boost_entry(
                &format!("pi_{}", i),
                listing,
                BoostPlanId::Day,
                now().plus_millis(i * 1_000),
            );
            entry.settle(LedgerStatus::Canceled, None, now()).unwrap();
            ledger.insert_if_absent(&entry).await.unwrap();
        }

        let recent = ledger
            .recent_for_listing(&listing, PaymentKind::ListingBoost, 5)
            .await
            .unwrap();

        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].payment_intent_id.as_str(), "pi_6");
        assert_eq!(recent[4].payment_intent_id.as_str(), "pi_2");
    }
}
