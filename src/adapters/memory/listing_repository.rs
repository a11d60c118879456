//! In-memory listing store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ListingId, Timestamp};
use crate::domain::promotion::{Listing, Promotion};
use crate::ports::{ListingRepository, PromotionWrite};

#[derive(Default)]
pub struct InMemoryListingRepository {
    listings: RwLock<HashMap<ListingId, Listing>>,
}

impl InMemoryListingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a listing, replacing any with the same id.
    pub async fn insert(&self, listing: Listing) {
        self.listings.write().await.insert(listing.id, listing);
    }

    pub async fn get(&self, id: &ListingId) -> Option<Listing> {
        self.listings.read().await.get(id).cloned()
    }
}

#[async_trait]
impl ListingRepository for InMemoryListingRepository {
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, DomainError> {
        Ok(self.get(id).await)
    }

    async fn set_promotion(
        &self,
        id: &ListingId,
        promotion: &Promotion,
    ) -> Result<bool, DomainError> {
        let mut listings = self.listings.write().await;
        match listings.get_mut(id) {
            Some(listing) => {
                listing.promotion = promotion.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn activate_promotion(
        &self,
        id: &ListingId,
        promotion: &Promotion,
        now: Timestamp,
    ) -> Result<PromotionWrite, DomainError> {
        let mut listings = self.listings.write().await;
        let Some(listing) = listings.get_mut(id) else {
            return Ok(PromotionWrite::NotFound);
        };
        if !listing.promotion.admits(promotion, now) {
            return Ok(PromotionWrite::Rejected(listing.promotion.clone()));
        }
        listing.promotion = promotion.clone();
        Ok(PromotionWrite::Applied)
    }

    async fn expire_promotions(&self, now: Timestamp) -> Result<u64, DomainError> {
        let mut listings = self.listings.write().await;
        let mut expired = 0;
        for listing in listings.values_mut() {
            if listing.promotion.is_stale_at(now) {
                listing.promotion = Promotion::inactive();
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{PaymentIntentId, UserId};
    use crate::domain::promotion::{BoostPlanCatalog, BoostPlanId};

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    fn listing() -> Listing {
        Listing::new(ListingId::new(), UserId::new("owner-1").unwrap())
    }

    #[tokio::test]
    async fn set_promotion_on_missing_listing_returns_false() {
        let repo = InMemoryListingRepository::new();
        let updated = repo
            .set_promotion(&ListingId::new(), &Promotion::inactive())
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn activate_promotion_keeps_another_payments_running_promotion() {
        let repo = InMemoryListingRepository::new();
        let catalog = BoostPlanCatalog::default();
        let plan = catalog.get(BoostPlanId::Day).unwrap();
        let listing = listing();
        let id = listing.id;
        repo.insert(listing).await;

        let first = Promotion::activated(plan, now()).with_payment(PaymentIntentId::new("pi_1").unwrap());
        let second = Promotion::activated(plan, now()).with_payment(PaymentIntentId::new("pi_2").unwrap());

        assert_eq!(repo.activate_promotion(&id, &first, now()).await.unwrap(), PromotionWrite::Applied);
        assert_eq!(
            repo.activate_promotion(&id, &second, now()).await.unwrap(),
            PromotionWrite::Rejected(first.clone())
        );
        assert_eq!(repo.activate_promotion(&id, &first, now()).await.unwrap(), PromotionWrite::Applied);
        assert_eq!(repo.get(&id).await.unwrap().promotion, first);
        assert_eq!(
            repo.activate_promotion(&ListingId::new(), &first, now()).await.unwrap(),
            PromotionWrite::NotFound
        );
    }

    #[tokio::test]
    async fn expire_promotions_resets_only_elapsed_windows() {
        let repo = InMemoryListingRepository::new();
        let catalog = BoostPlanCatalog::default();
        let plan = catalog.get(BoostPlanId::Day).unwrap();

        let mut elapsed = listing();
        elapsed.promotion = Promotion::activated(plan, now().add_days(-2));
        let mut running = listing();
        running.promotion = Promotion::activated(plan, now());
        let (elapsed_id, running_id) = (elapsed.id, running.id);
        repo.insert(elapsed).await;
        repo.insert(running).await;

        let count = repo.expire_promotions(now()).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(repo.get(&elapsed_id).await.unwrap().promotion, Promotion::inactive());
        assert!(repo.get(&running_id).await.unwrap().promotion.is_promoted);
        assert_eq!(repo.expire_promotions(now()).await.unwrap(), 0);
    }
}
