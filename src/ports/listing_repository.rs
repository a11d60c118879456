//! Listing repository port.
//!
//! Billing never loads-modifies-saves a listing. Every write is a targeted
//! update of the promotion fields so that redelivered events and the sweeper
//! cannot clobber each other.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ListingId, Timestamp};
use crate::domain::promotion::{Listing, Promotion};

/// Result of a conditional promotion write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionWrite {
    Applied,
    /// Another payment's promotion is running; it is returned unchanged.
    Rejected(Promotion),
    NotFound,
}

#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Find a listing by its ID. Returns `None` if not found.
    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>, DomainError>;

    /// Overwrite the promotion fields of one listing.
    ///
    /// Returns `false` if the listing does not exist.
    async fn set_promotion(&self, id: &ListingId, promotion: &Promotion)
        -> Result<bool, DomainError>;

    /// Write `promotion` only if the stored one admits it at `now`
    /// (see [`Promotion::admits`]), as a single conditional update.
    async fn activate_promotion(
        &self,
        id: &ListingId,
        promotion: &Promotion,
        now: Timestamp,
    ) -> Result<PromotionWrite, DomainError>;

    /// Reset every listing whose promotion ended before `now`, in one bulk update.
    ///
    /// Returns the number of listings reset.
    async fn expire_promotions(&self, now: Timestamp) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn ListingRepository) {}
    }
}
