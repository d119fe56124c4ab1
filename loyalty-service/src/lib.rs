pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::governor::clock::Clock;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{rate_limit_middleware, KeyedRateLimiter},
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::LoyaltyConfig;
use crate::services::{LoyaltyStore, TierEngine};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: LoyaltyConfig,
    pub store: Arc<dyn LoyaltyStore>,
    pub engine: TierEngine,
}

/// Routes for the loyalty API. Probes and metrics bypass the rate limiter.
pub fn build_router<C>(state: AppState, rate_limiter: KeyedRateLimiter<C>) -> Router
where
    C: Clock + Send + Sync + 'static,
{
    let api = Router::new()
        .route("/tiers", get(handlers::tiers::list_tiers))
        .route("/customers", post(handlers::customers::register_customer))
        .route("/customers/:identifier", get(handlers::customers::get_customer))
        .route(
            "/customers/:identifier/coupons",
            get(handlers::customers::list_customer_coupons),
        )
        .route(
            "/customers/:identifier/coupons/reconcile",
            post(handlers::customers::reconcile_customer_coupons),
        )
        .route(
            "/orders/status-changes",
            post(handlers::orders::order_status_changed),
        )
        .route("/coupons/check", post(handlers::coupons::check_coupon))
        .route("/coupons/:code", get(handlers::coupons::get_coupon))
        .layer(from_fn_with_state(rate_limiter, rate_limit_middleware::<C>));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .merge(api)
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}
