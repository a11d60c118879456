//! HTTP adapter for listing boosts, premium subscriptions, and processor webhooks.
//!
//! - `POST /service/boost/:listing_id` - Start or reuse a boost payment
//! - `GET /service/boost/:listing_id/status` - Promotion state and payment history
//! - `POST /user/premium` - Start a premium subscription
//! - `GET /user/premium/status` - Premium state, subscription, and invoices
//! - `POST /user/premium/cancel` - Cancel now or at period end
//! - `POST /user/premium/sync` - Reconcile premium with the processor
//! - `POST /webhook` - Signed processor events

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{
    BillingApiError, BillingAppState, RequestingUser, WebhookApiError, SIGNATURE_HEADER,
    USER_ID_HEADER,
};
pub use routes::{billing_router, boost_routes, premium_routes, webhook_routes};
