//! Marketplace Billing - Paid listing boosts and premium subscriptions
//!
//! Creates payment intents and subscriptions with the payment processor,
//! keeps a ledger of every payment attempt, and reconciles signed processor
//! webhooks into listing promotions and user premium status exactly once.
//! A scheduled sweep resets promotions and premium that have lapsed.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
