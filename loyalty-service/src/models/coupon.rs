use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::tier::{Amount, TierDefinition};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    FixedAmount,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CouponStatus {
    Active,
    Expired,
    Used,
}

impl std::fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CouponStatus::Active => write!(f, "active"),
            CouponStatus::Expired => write!(f, "expired"),
            CouponStatus::Used => write!(f, "used"),
        }
    }
}

/// Single-use discount credential tied to one customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    #[serde(rename = "_id")]
    pub id: String,
    pub code: String,
    pub owner_id: String,
    pub kind: CouponKind,
    pub value: Amount,
    pub min_order_value: Amount,
    pub max_usage: u32,
    pub used_count: u32,
    pub status: CouponStatus,
    /// Threshold whose crossing issued this coupon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_level: Option<Amount>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_utc: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_utc: DateTime<Utc>,
}

/// Why a coupon cannot be applied to an order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CouponRejection {
    #[error("coupon belongs to another customer")]
    NotOwner,

    #[error("coupon has expired")]
    Expired,

    #[error("coupon has already been used")]
    Exhausted,

    #[error("order subtotal must be at least {min_order_value}")]
    BelowMinimum { min_order_value: Amount },
}

impl Coupon {
    pub fn tier_reward(
        code: String,
        owner_id: &str,
        tier: &TierDefinition,
        min_order_value: Amount,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            code,
            owner_id: owner_id.to_string(),
            kind: CouponKind::FixedAmount,
            value: tier.discount,
            min_order_value,
            max_usage: 1,
            used_count: 0,
            status: CouponStatus::Active,
            tier_level: Some(tier.threshold),
            expires_utc: now + validity,
            created_utc: now,
        }
    }

    /// Stored status, with an active coupon past its expiry reported as expired
    /// before the sweep has persisted it.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CouponStatus {
        match self.status {
            CouponStatus::Active if self.expires_utc <= now => CouponStatus::Expired,
            status => status,
        }
    }

    /// Discount this coupon would take off an order of `order_subtotal` placed
    /// by `customer_id`. Does not consume the coupon.
    pub fn check_eligibility(
        &self,
        customer_id: &str,
        order_subtotal: Amount,
        now: DateTime<Utc>,
    ) -> Result<Amount, CouponRejection> {
        if self.owner_id != customer_id {
            return Err(CouponRejection::NotOwner);
        }

        match self.effective_status(now) {
            CouponStatus::Expired => return Err(CouponRejection::Expired),
            CouponStatus::Used => return Err(CouponRejection::Exhausted),
            CouponStatus::Active => {}
        }

        if self.used_count >= self.max_usage {
            return Err(CouponRejection::Exhausted);
        }

        if order_subtotal < self.min_order_value {
            return Err(CouponRejection::BelowMinimum {
                min_order_value: self.min_order_value,
            });
        }

        match self.kind {
            CouponKind::FixedAmount => Ok(self.value.min(order_subtotal)),
        }
    }
}
