//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_premium, get_boost_status, get_premium_status, handle_webhook, request_boost,
    request_premium, sync_premium, BillingAppState,
};

/// Listing boost routes.
///
/// - `POST /service/boost/:listing_id` - Start or reuse a boost payment
/// - `GET /service/boost/:listing_id/status` - Promotion state and history
pub fn boost_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/service/boost/:listing_id", post(request_boost))
        .route("/service/boost/:listing_id/status", get(get_boost_status))
}

/// Premium subscription routes, all scoped to the requesting user.
pub fn premium_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/user/premium", post(request_premium))
        .route("/user/premium/status", get(get_premium_status))
        .route("/user/premium/cancel", post(cancel_premium))
        .route("/user/premium/sync", post(sync_premium))
}

/// Processor webhook route.
///
/// Carries no user context; deliveries are authenticated by signature.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/webhook", post(handle_webhook))
}

/// Every billing route in one router.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .merge(boost_routes())
        .merge(premium_routes())
        .merge(webhook_routes())
}
