//! HTTP adapters - REST API implementations.

pub mod billing;

use axum::http::HeaderValue;
use axum::{routing::get, Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

pub use billing::{billing_router, BillingAppState};
use billing::HealthResponse;

/// GET /health - Liveness check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Builds the complete application router with tracing, timeout, and CORS layers.
pub fn app_router(state: BillingAppState, server: &ServerConfig) -> Router {
    let origins = server
        .cors_origins_list()
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    Router::new()
        .route("/health", get(health))
        .merge(billing_router())
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(AllowOrigin::list(origins)))
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(TraceLayer::new_for_http())
}
