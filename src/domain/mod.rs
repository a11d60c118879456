//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine trait)
//! - `promotion` - Boost plans and the listing promotion state
//! - `subscription` - Premium status and the subscription snapshot rule
//! - `ledger` - Payment ledger entries and their monotonic status
//! - `webhook` - Signature verification and idempotent event dispatch
//! - `billing` - Errors shared by boost and premium operations

pub mod billing;
pub mod foundation;
pub mod ledger;
pub mod promotion;
pub mod subscription;
pub mod webhook;
