//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `http` - Axum routes for boosts, premium, and processor webhooks
//! - `memory` - In-memory repositories for tests and local runs
//! - `postgres` - PostgreSQL repositories (sqlx)
//! - `scheduler` - Cron-driven expiry sweep
//! - `stripe` - Stripe payment processor and its test double

pub mod http;
pub mod memory;
pub mod postgres;
pub mod scheduler;
pub mod stripe;
