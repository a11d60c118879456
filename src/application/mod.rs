//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

pub mod handlers;

pub use handlers::{
    // Boost handlers
    GetBoostStatusHandler, GetBoostStatusQuery, GetBoostStatusResult,
    RequestBoostCommand, RequestBoostHandler, RequestBoostResult,
    // Premium handlers
    CancelPremiumCommand, CancelPremiumHandler, CancelPremiumResult,
    GetPremiumStatusHandler, GetPremiumStatusQuery, GetPremiumStatusResult,
    RequestPremiumCommand, RequestPremiumHandler, RequestPremiumResult,
    SyncPremiumCommand, SyncPremiumHandler, SyncPremiumResult,
    // Maintenance
    SweepExpiredHandler, SweepReport,
    // Webhooks
    build_webhook_registry, HandleProcessorWebhookCommand, HandleProcessorWebhookHandler,
    HandleProcessorWebhookResult, WebhookHandlerDeps,
};
