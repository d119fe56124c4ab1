use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;

use crate::models::{Amount, Coupon, Customer};

/// Outcome of a coupon insert that did not succeed.
#[derive(Debug, Error)]
pub enum CouponInsertError {
    #[error("coupon code already exists")]
    DuplicateCode,

    #[error("customer already holds a coupon for this tier")]
    DuplicateTier,

    #[error(transparent)]
    Store(#[from] AppError),
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn find_customer_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Customer>, AppError>;

    /// Fails with `AppError::Conflict` when the identifier is taken.
    async fn insert_customer(&self, customer: &Customer) -> Result<(), AppError>;

    /// Add `amount` to the customer's spend and remember `order_id`, as one
    /// atomic step. Returns the updated record, or `None` when the order was
    /// already credited (or the customer no longer exists).
    async fn credit_order(
        &self,
        customer_id: &str,
        order_id: &str,
        amount: Amount,
    ) -> Result<Option<Customer>, AppError>;

    /// Raise the stored tier level to `tier_level`; never lowers it.
    async fn raise_tier_level(&self, customer_id: &str, tier_level: Amount)
        -> Result<(), AppError>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Insert under the store's uniqueness constraints on `code` and on
    /// `(owner_id, tier_level)`.
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), CouponInsertError>;

    async fn coupon_code_exists(&self, code: &str) -> Result<bool, AppError>;

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError>;

    async fn find_coupon_for_tier(
        &self,
        owner_id: &str,
        tier_level: Amount,
    ) -> Result<Option<Coupon>, AppError>;

    /// Newest first.
    async fn list_coupons_for_owner(&self, owner_id: &str) -> Result<Vec<Coupon>, AppError>;

    /// Mark active coupons with `expires_utc <= now` as expired. Returns how
    /// many changed.
    async fn expire_overdue_coupons(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Everything the loyalty engine persists.
#[async_trait]
pub trait LoyaltyStore: CustomerStore + CouponStore {
    async fn health_check(&self) -> Result<(), AppError>;
}
