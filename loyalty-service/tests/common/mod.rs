#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use loyalty_service::config::{LoyaltyConfig, MongoConfig, RateLimitConfig, RewardsConfig};
use loyalty_service::models::{Amount, Coupon, Customer, OrderStatus, OrderStatusChange};
use loyalty_service::services::{
    CodeGenerator, CouponInsertError, CouponPolicy, CouponStore, CustomerStore,
    InMemoryLoyaltyStore, LoyaltyStore, RandomCodeGenerator, TierEngine,
};
use loyalty_service::{build_router, AppState};
use service_core::config::Config as CoreConfig;
use service_core::error::AppError;
use service_core::governor::clock::FakeRelativeClock;
use service_core::middleware::rate_limit::KeyedRateLimiter;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub fn test_config() -> LoyaltyConfig {
    LoyaltyConfig {
        common: CoreConfig {
            port: 0,
            ..CoreConfig::default()
        },
        mongodb: MongoConfig {
            uri: "mongodb://localhost:27017".to_string(),
            database: format!("loyalty_test_{}", uuid::Uuid::new_v4()),
        },
        rewards: RewardsConfig::default(),
        rate_limit: RateLimitConfig {
            requests: 1_000,
            window_seconds: 60,
        },
        sweep_interval_seconds: 300,
    }
}

pub fn engine_with(store: Arc<dyn LoyaltyStore>, codes: Arc<dyn CodeGenerator>) -> TierEngine {
    let config = test_config();
    TierEngine::new(
        store,
        config.rewards.tiers.clone(),
        codes,
        CouponPolicy::default(),
    )
}

pub fn random_codes() -> Arc<dyn CodeGenerator> {
    Arc::new(RandomCodeGenerator::new("SEA", 6))
}

pub async fn customer(store: &InMemoryLoyaltyStore, identifier: &str) -> Customer {
    let customer = Customer::new(identifier, "Nguyen Van A");
    store
        .insert_customer(&customer)
        .await
        .expect("Failed to insert customer");
    customer
}

pub fn delivered(order_id: &str, identifier: &str, subtotal: Amount) -> OrderStatusChange {
    OrderStatusChange {
        order_id: order_id.to_string(),
        customer_identifier: identifier.to_string(),
        previous_status: OrderStatus::Shipping,
        new_status: OrderStatus::Delivered,
        product_subtotal: subtotal,
        shipping_fee: 30_000,
        coupon_discount: 0,
    }
}

/// Hands out a fixed script of codes, then falls back to random ones.
pub struct ScriptedCodes {
    script: Mutex<VecDeque<String>>,
    fallback: RandomCodeGenerator,
    pub drawn: AtomicUsize,
}

impl ScriptedCodes {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            script: Mutex::new(codes.iter().map(|c| c.to_string()).collect()),
            fallback: RandomCodeGenerator::new("SEA", 6),
            drawn: AtomicUsize::new(0),
        }
    }

    pub fn drawn(&self) -> usize {
        self.drawn.load(Ordering::SeqCst)
    }
}

impl CodeGenerator for ScriptedCodes {
    fn generate(&self) -> String {
        self.drawn.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.generate())
    }
}

/// Delegating store that reports every code as free, so a collision is only
/// discovered by the insert, as when two issuers race.
pub struct RacyStore {
    pub inner: Arc<InMemoryLoyaltyStore>,
}

#[async_trait]
impl CustomerStore for RacyStore {
    async fn find_customer_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Customer>, AppError> {
        self.inner.find_customer_by_identifier(identifier).await
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<(), AppError> {
        self.inner.insert_customer(customer).await
    }

    async fn credit_order(
        &self,
        customer_id: &str,
        order_id: &str,
        amount: Amount,
    ) -> Result<Option<Customer>, AppError> {
        self.inner.credit_order(customer_id, order_id, amount).await
    }

    async fn raise_tier_level(
        &self,
        customer_id: &str,
        tier_level: Amount,
    ) -> Result<(), AppError> {
        self.inner.raise_tier_level(customer_id, tier_level).await
    }
}

#[async_trait]
impl CouponStore for RacyStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), CouponInsertError> {
        self.inner.insert_coupon(coupon).await
    }

    async fn coupon_code_exists(&self, _code: &str) -> Result<bool, AppError> {
        Ok(false)
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError> {
        self.inner.find_coupon_by_code(code).await
    }

    async fn find_coupon_for_tier(
        &self,
        owner_id: &str,
        tier_level: Amount,
    ) -> Result<Option<Coupon>, AppError> {
        self.inner.find_coupon_for_tier(owner_id, tier_level).await
    }

    async fn list_coupons_for_owner(&self, owner_id: &str) -> Result<Vec<Coupon>, AppError> {
        self.inner.list_coupons_for_owner(owner_id).await
    }

    async fn expire_overdue_coupons(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.inner.expire_overdue_coupons(now).await
    }
}

#[async_trait]
impl LoyaltyStore for RacyStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Store whose coupon writes always fail, for best-effort semantics.
pub struct BrokenCouponStore {
    pub inner: Arc<InMemoryLoyaltyStore>,
}

#[async_trait]
impl CustomerStore for BrokenCouponStore {
    async fn find_customer_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Customer>, AppError> {
        self.inner.find_customer_by_identifier(identifier).await
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<(), AppError> {
        self.inner.insert_customer(customer).await
    }

    async fn credit_order(
        &self,
        customer_id: &str,
        order_id: &str,
        amount: Amount,
    ) -> Result<Option<Customer>, AppError> {
        self.inner.credit_order(customer_id, order_id, amount).await
    }

    async fn raise_tier_level(
        &self,
        customer_id: &str,
        tier_level: Amount,
    ) -> Result<(), AppError> {
        self.inner.raise_tier_level(customer_id, tier_level).await
    }
}

#[async_trait]
impl CouponStore for BrokenCouponStore {
    async fn insert_coupon(&self, _coupon: &Coupon) -> Result<(), CouponInsertError> {
        Err(CouponInsertError::Store(AppError::DatabaseError(
            anyhow::anyhow!("write rejected"),
        )))
    }

    async fn coupon_code_exists(&self, code: &str) -> Result<bool, AppError> {
        self.inner.coupon_code_exists(code).await
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError> {
        self.inner.find_coupon_by_code(code).await
    }

    async fn find_coupon_for_tier(
        &self,
        owner_id: &str,
        tier_level: Amount,
    ) -> Result<Option<Coupon>, AppError> {
        self.inner.find_coupon_for_tier(owner_id, tier_level).await
    }

    async fn list_coupons_for_owner(&self, owner_id: &str) -> Result<Vec<Coupon>, AppError> {
        self.inner.list_coupons_for_owner(owner_id).await
    }

    async fn expire_overdue_coupons(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.inner.expire_overdue_coupons(now).await
    }
}

#[async_trait]
impl LoyaltyStore for BrokenCouponStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Store whose next tier-level write fails, leaving the spend credited.
pub struct FlakyTierStore {
    pub inner: Arc<InMemoryLoyaltyStore>,
    fail_next_tier_write: AtomicBool,
}

impl FlakyTierStore {
    pub fn new(inner: Arc<InMemoryLoyaltyStore>) -> Self {
        Self {
            inner,
            fail_next_tier_write: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl CustomerStore for FlakyTierStore {
    async fn find_customer_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Customer>, AppError> {
        self.inner.find_customer_by_identifier(identifier).await
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<(), AppError> {
        self.inner.insert_customer(customer).await
    }

    async fn credit_order(
        &self,
        customer_id: &str,
        order_id: &str,
        amount: Amount,
    ) -> Result<Option<Customer>, AppError> {
        self.inner.credit_order(customer_id, order_id, amount).await
    }

    async fn raise_tier_level(
        &self,
        customer_id: &str,
        tier_level: Amount,
    ) -> Result<(), AppError> {
        if self.fail_next_tier_write.swap(false, Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!("tier write timed out")));
        }
        self.inner.raise_tier_level(customer_id, tier_level).await
    }
}

#[async_trait]
impl CouponStore for FlakyTierStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), CouponInsertError> {
        self.inner.insert_coupon(coupon).await
    }

    async fn coupon_code_exists(&self, code: &str) -> Result<bool, AppError> {
        self.inner.coupon_code_exists(code).await
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError> {
        self.inner.find_coupon_by_code(code).await
    }

    async fn find_coupon_for_tier(
        &self,
        owner_id: &str,
        tier_level: Amount,
    ) -> Result<Option<Coupon>, AppError> {
        self.inner.find_coupon_for_tier(owner_id, tier_level).await
    }

    async fn list_coupons_for_owner(&self, owner_id: &str) -> Result<Vec<Coupon>, AppError> {
        self.inner.list_coupons_for_owner(owner_id).await
    }

    async fn expire_overdue_coupons(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.inner.expire_overdue_coupons(now).await
    }
}

#[async_trait]
impl LoyaltyStore for FlakyTierStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryLoyaltyStore>,
    pub clock: FakeRelativeClock,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_rate_limit(1_000, 60)
    }

    pub fn with_rate_limit(requests: u32, window_seconds: u64) -> Self {
        let config = test_config();
        let store = Arc::new(InMemoryLoyaltyStore::new());
        let engine = engine_with(store.clone(), random_codes());
        let clock = FakeRelativeClock::default();
        let rate_limiter = KeyedRateLimiter::with_clock(requests, window_seconds, clock.clone())
            .expect("Failed to create rate limiter");

        let state = AppState {
            config,
            store: store.clone(),
            engine,
        };

        TestApp {
            router: build_router(state, rate_limiter),
            store,
            clock,
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.send(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, body)
    }
}
