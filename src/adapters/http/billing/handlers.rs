//! HTTP handlers for boost, premium, and webhook endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Duration;
use serde_json::json;
use tracing::{error, warn};

use crate::application::handlers::billing::{
    CancelPremiumCommand, CancelPremiumHandler, GetBoostStatusHandler, GetBoostStatusQuery,
    GetPremiumStatusHandler, GetPremiumStatusQuery, RequestBoostCommand, RequestBoostHandler,
    RequestPremiumCommand, RequestPremiumHandler, SyncPremiumCommand, SyncPremiumHandler,
    DEFAULT_FRESHNESS_WINDOW_MINUTES,
};
use crate::application::handlers::webhooks::{
    HandleProcessorWebhookCommand, HandleProcessorWebhookHandler, WebhookHandlerDeps,
};
use crate::domain::billing::BillingError;
use crate::domain::foundation::{ListingId, UserId};
use crate::domain::promotion::BoostPlanCatalog;
use crate::domain::subscription::PremiumTerms;
use crate::domain::webhook::WebhookError;
use crate::ports::{BillingAccountRepository, ListingRepository, PaymentLedger, PaymentProcessor};

use super::dto::{
    BoostRequest, BoostResponse, BoostStatusResponse, CancelPremiumRequest,
    CancelPremiumResponse, ErrorResponse, PremiumResponse, PremiumStatusResponse,
    SyncPremiumResponse, WebhookAck,
};

/// Header carrying the processor's webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Header carrying the authenticated user id, set by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing routes.
///
/// Cloned per request; command handlers are built on demand from it.
#[derive(Clone)]
pub struct BillingAppState {
    pub listings: Arc<dyn ListingRepository>,
    pub accounts: Arc<dyn BillingAccountRepository>,
    pub ledger: Arc<dyn PaymentLedger>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub catalog: Arc<BoostPlanCatalog>,
    pub terms: Arc<PremiumTerms>,
    pub webhook: Arc<HandleProcessorWebhookHandler>,
    pub freshness_window: Duration,
    /// Return upstream and infrastructure messages to clients.
    pub expose_error_details: bool,
}

impl BillingAppState {
    pub fn new(deps: WebhookHandlerDeps, webhook: Arc<HandleProcessorWebhookHandler>) -> Self {
        Self {
            listings: deps.listings,
            accounts: deps.accounts,
            ledger: deps.ledger,
            processor: deps.processor,
            catalog: deps.catalog,
            terms: deps.terms,
            webhook,
            freshness_window: Duration::minutes(DEFAULT_FRESHNESS_WINDOW_MINUTES),
            expose_error_details: false,
        }
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    pub fn request_boost_handler(&self) -> RequestBoostHandler {
        RequestBoostHandler::new(
            self.listings.clone(),
            self.ledger.clone(),
            self.processor.clone(),
            self.catalog.clone(),
        )
        .with_freshness_window(self.freshness_window)
    }

    pub fn boost_status_handler(&self) -> GetBoostStatusHandler {
        GetBoostStatusHandler::new(self.listings.clone(), self.ledger.clone())
    }

    pub fn request_premium_handler(&self) -> RequestPremiumHandler {
        RequestPremiumHandler::new(
            self.accounts.clone(),
            self.ledger.clone(),
            self.processor.clone(),
            self.terms.clone(),
        )
    }

    pub fn premium_status_handler(&self) -> GetPremiumStatusHandler {
        GetPremiumStatusHandler::new(
            self.accounts.clone(),
            self.processor.clone(),
            self.terms.clone(),
        )
    }

    pub fn cancel_premium_handler(&self) -> CancelPremiumHandler {
        CancelPremiumHandler::new(
            self.accounts.clone(),
            self.processor.clone(),
            self.terms.clone(),
        )
    }

    pub fn sync_premium_handler(&self) -> SyncPremiumHandler {
        SyncPremiumHandler::new(
            self.accounts.clone(),
            self.processor.clone(),
            self.terms.clone(),
        )
    }

    fn reject(&self, error: BillingError) -> BillingApiError {
        BillingApiError {
            error,
            expose_details: self.expose_error_details,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Requesting user, taken from the `X-User-Id` header set by the gateway.
#[derive(Debug, Clone)]
pub struct RequestingUser {
    pub user_id: UserId,
}

/// Rejection when no usable user id accompanies the request.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("unauthorized", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestingUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s.trim()).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(RequestingUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Boost Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /service/boost/:listing_id - Start or reuse a boost payment
pub async fn request_boost(
    State(state): State<BillingAppState>,
    user: RequestingUser,
    Path(listing_id): Path<String>,
    Json(request): Json<BoostRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let listing_id = parse_listing_id(&state, &listing_id)?;
    let cmd = RequestBoostCommand {
        listing_id,
        plan_id: request.plan_id,
        user_id: user.user_id,
    };

    let result = state
        .request_boost_handler()
        .handle(cmd)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(BoostResponse::from(result)))
}

/// GET /service/boost/:listing_id/status - Promotion state and recent payments
pub async fn get_boost_status(
    State(state): State<BillingAppState>,
    user: RequestingUser,
    Path(listing_id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let listing_id = parse_listing_id(&state, &listing_id)?;
    let query = GetBoostStatusQuery {
        listing_id,
        user_id: user.user_id,
    };

    let result = state
        .boost_status_handler()
        .handle(query)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(BoostStatusResponse::from(result)))
}

fn parse_listing_id(state: &BillingAppState, raw: &str) -> Result<ListingId, BillingApiError> {
    ListingId::from_str(raw).map_err(|e| state.reject(BillingError::from(e)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Premium Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /user/premium - Start a premium subscription
pub async fn request_premium(
    State(state): State<BillingAppState>,
    user: RequestingUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = RequestPremiumCommand {
        user_id: user.user_id,
    };

    let result = state
        .request_premium_handler()
        .handle(cmd)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(PremiumResponse::from(result)))
}

/// GET /user/premium/status - Premium flag, subscription, and invoices
pub async fn get_premium_status(
    State(state): State<BillingAppState>,
    user: RequestingUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let query = GetPremiumStatusQuery {
        user_id: user.user_id,
    };

    let result = state
        .premium_status_handler()
        .handle(query)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(PremiumStatusResponse::from(result)))
}

/// POST /user/premium/cancel - Cancel now or at period end
///
/// An empty body cancels at period end.
pub async fn cancel_premium(
    State(state): State<BillingAppState>,
    user: RequestingUser,
    body: Bytes,
) -> Result<impl IntoResponse, BillingApiError> {
    let request = if body.is_empty() {
        CancelPremiumRequest::default()
    } else {
        serde_json::from_slice::<CancelPremiumRequest>(&body)
            .map_err(|e| state.reject(BillingError::validation("body", e.to_string())))?
    };
    let cmd = CancelPremiumCommand {
        user_id: user.user_id,
        at_period_end: request.at_period_end,
    };

    let result = state
        .cancel_premium_handler()
        .handle(cmd)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(CancelPremiumResponse::from(result)))
}

/// POST /user/premium/sync - Re-read the subscription from the processor
pub async fn sync_premium(
    State(state): State<BillingAppState>,
    user: RequestingUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = SyncPremiumCommand {
        user_id: user.user_id,
    };

    let result = state
        .sync_premium_handler()
        .handle(cmd)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(SyncPremiumResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Endpoint
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhook - Verify and reconcile a processor event
///
/// Every verified delivery is acknowledged with `{received: true}`, whether or
/// not the event changed anything. Verification failures (401) and transient
/// failures to reconcile or record the event (5xx) are reported, so the
/// processor retries exactly those.
pub async fn handle_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let cmd = HandleProcessorWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    state.webhook.handle(cmd).await.map_err(WebhookApiError)?;

    Ok(Json(WebhookAck::received()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error that converts billing errors to HTTP responses.
pub struct BillingApiError {
    error: BillingError,
    expose_details: bool,
}

impl BillingApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.error {
            BillingError::ValidationFailed { .. } | BillingError::InvalidPlan { .. } => {
                StatusCode::BAD_REQUEST
            }
            BillingError::PaymentMethodRequired => StatusCode::PAYMENT_REQUIRED,
            BillingError::Forbidden(_) => StatusCode::FORBIDDEN,
            BillingError::ListingNotFound(_)
            | BillingError::UserNotFound(_)
            | BillingError::NoActiveSubscription(_) => StatusCode::NOT_FOUND,
            BillingError::AlreadyPromoted { .. }
            | BillingError::DuplicatePayment(_)
            | BillingError::PaymentInProgress { .. } => {
                StatusCode::CONFLICT
            }
            BillingError::Upstream(_) | BillingError::Infrastructure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> ErrorResponse {
        let code = self.error.code().to_string().to_lowercase();

        if self.error.is_internal() && !self.expose_details {
            return ErrorResponse::new(code, "An internal error occurred");
        }

        let message = self.error.message();
        match &self.error {
            BillingError::InvalidPlan { available, .. } => {
                ErrorResponse::with_details(code, message, json!({ "availablePlans": available }))
            }
            BillingError::AlreadyPromoted {
                promoted_until,
                remaining,
            } => ErrorResponse::with_details(
                code,
                message,
                json!({
                    "promotedUntil": promoted_until.to_string(),
                    "remainingTime": {
                        "hours": remaining.hours,
                        "minutes": remaining.minutes,
                        "totalMillis": remaining.total_millis,
                    },
                }),
            ),
            BillingError::DuplicatePayment(payment_intent_id) => ErrorResponse::with_details(
                code,
                message,
                json!({ "paymentIntentId": payment_intent_id.to_string() }),
            ),
            BillingError::PaymentInProgress {
                payment_intent_id,
                plan,
            } => ErrorResponse::with_details(
                code,
                message,
                json!({
                    "paymentIntentId": payment_intent_id.to_string(),
                    "planId": plan.map(|p| p.as_str()),
                }),
            ),
            _ => ErrorResponse::new(code, message),
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self.error, "Billing request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

/// API error for webhook deliveries.
pub struct WebhookApiError(WebhookError);

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let message = if status.is_server_error() {
            error!(error = %self.0, retryable = self.0.is_retryable(), "Webhook could not be reconciled");
            "Webhook could not be processed".to_string()
        } else {
            warn!(error = %self.0, "Webhook rejected");
            self.0.to_string()
        };
        let code = if self.0.is_authentication_failure() {
            "invalid_signature"
        } else if status.is_server_error() {
            "internal_error"
        } else {
            "invalid_payload"
        };
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{PaymentIntentId, Timestamp};
    use crate::domain::promotion::RemainingTime;
    use axum::body::to_bytes;

    fn api_error(error: BillingError, expose_details: bool) -> BillingApiError {
        BillingApiError {
            error,
            expose_details,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (BillingError::validation("plan_id", "empty"), StatusCode::BAD_REQUEST),
            (BillingError::invalid_plan("2h", vec!["24h"]), StatusCode::BAD_REQUEST),
            (BillingError::PaymentMethodRequired, StatusCode::PAYMENT_REQUIRED),
            (BillingError::forbidden("not yours"), StatusCode::FORBIDDEN),
            (
                BillingError::listing_not_found(ListingId::new()),
                StatusCode::NOT_FOUND,
            ),
            (
                BillingError::DuplicatePayment(PaymentIntentId::new("pi_1").unwrap()),
                StatusCode::CONFLICT,
            ),
            (
                BillingError::PaymentInProgress {
                    payment_intent_id: PaymentIntentId::new("pi_2").unwrap(),
                    plan: None,
                },
                StatusCode::CONFLICT,
            ),
            (BillingError::upstream("timeout"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(api_error(error, false).status_code(), expected);
        }
    }

    #[tokio::test]
    async fn payment_method_required_uses_lowercase_code() {
        let response = api_error(BillingError::PaymentMethodRequired, false).into_response();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "payment_method_required");
    }

    #[tokio::test]
    async fn upstream_message_is_hidden_outside_development() {
        let response =
            api_error(BillingError::upstream("card_declined: sk_live_leak"), false).into_response();

        let body = body_json(response).await;
        assert_eq!(body["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn upstream_message_is_shown_in_development() {
        let response = api_error(BillingError::upstream("rate limited"), true).into_response();

        let body = body_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn already_promoted_carries_remaining_time() {
        let error = BillingError::AlreadyPromoted {
            promoted_until: Timestamp::from_unix_secs(1_705_276_800).unwrap(),
            remaining: RemainingTime {
                hours: 5,
                minutes: 0,
                total_millis: 18_000_000,
            },
        };

        let response = api_error(error, false).into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["details"]["remainingTime"]["hours"], 5);
        assert_eq!(body["details"]["promotedUntil"], "2024-01-15T00:00:00.000Z");
    }

    #[tokio::test]
    async fn invalid_signature_is_unauthorized() {
        let response = WebhookApiError(WebhookError::InvalidSignature).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid_signature");
    }

    #[tokio::test]
    async fn store_failure_is_server_error() {
        let response =
            WebhookApiError(WebhookError::Database("pool timed out".to_string())).into_response();

        assert!(response.status().is_server_error());
        let body = body_json(response).await;
        assert_eq!(body["message"], "Webhook could not be processed");
    }
}
