//! Promotion module - per-listing boost state.

mod listing;
mod plan;

pub use listing::{Listing, Promotion, PromotionPhase, RemainingTime};
pub use plan::{BoostPlan, BoostPlanCatalog, BoostPlanId};
