//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod billing;
pub mod webhooks;

pub use billing::*;
pub use webhooks::*;
