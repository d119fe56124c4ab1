//! Request and response bodies for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    Amount, Coupon, CouponKind, CouponStatus, Customer, OrderStatus, OrderStatusChange,
    TierDefinition, TierTable,
};
use crate::services::SpendOutcome;

/// Upper bound accepted for any single amount on the wire.
pub const MAX_AMOUNT: Amount = 1_000_000_000_000;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterCustomerRequest {
    #[validate(length(min = 1, max = 64))]
    pub identifier: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TierResponse {
    pub threshold: Amount,
    pub discount: Amount,
    pub name: String,
}

impl From<&TierDefinition> for TierResponse {
    fn from(tier: &TierDefinition) -> Self {
        Self {
            threshold: tier.threshold,
            discount: tier.discount,
            name: tier.name.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NextTierResponse {
    pub tier: TierResponse,
    pub remaining: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CustomerResponse {
    pub id: String,
    pub identifier: String,
    pub name: String,
    pub total_spent: Amount,
    pub tier_level: Amount,
    pub tier_name: Option<String>,
    pub next_tier: Option<NextTierResponse>,
}

impl CustomerResponse {
    pub fn new(customer: Customer, tiers: &TierTable) -> Self {
        let tier_name = tiers
            .definition(customer.tier_level)
            .map(|tier| tier.name.clone());
        let next_tier = tiers
            .next_after(customer.total_spent)
            .map(|tier| NextTierResponse {
                tier: TierResponse::from(tier),
                remaining: tier.threshold - customer.total_spent,
            });

        Self {
            id: customer.id,
            identifier: customer.identifier,
            name: customer.name,
            total_spent: customer.total_spent,
            tier_level: customer.tier_level,
            tier_name,
            next_tier,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CouponResponse {
    pub code: String,
    pub kind: CouponKind,
    pub value: Amount,
    pub min_order_value: Amount,
    pub max_usage: u32,
    pub used_count: u32,
    pub status: CouponStatus,
    pub tier_level: Option<Amount>,
    pub expires_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl CouponResponse {
    pub fn new(coupon: Coupon, now: DateTime<Utc>) -> Self {
        Self {
            status: coupon.effective_status(now),
            code: coupon.code,
            kind: coupon.kind,
            value: coupon.value,
            min_order_value: coupon.min_order_value,
            max_usage: coupon.max_usage,
            used_count: coupon.used_count,
            tier_level: coupon.tier_level,
            expires_utc: coupon.expires_utc,
            created_utc: coupon.created_utc,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct OrderStatusChangeRequest {
    #[validate(length(min = 1, max = 128))]
    pub order_id: String,
    #[validate(length(min = 1, max = 64))]
    pub customer_identifier: String,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    #[validate(range(min = 0, max = MAX_AMOUNT))]
    pub product_subtotal: Amount,
    #[serde(default)]
    #[validate(range(min = 0, max = MAX_AMOUNT))]
    pub shipping_fee: Amount,
    #[serde(default)]
    #[validate(range(min = 0, max = MAX_AMOUNT))]
    pub coupon_discount: Amount,
}

impl From<OrderStatusChangeRequest> for OrderStatusChange {
    fn from(req: OrderStatusChangeRequest) -> Self {
        Self {
            order_id: req.order_id,
            customer_identifier: req.customer_identifier,
            previous_status: req.previous_status,
            new_status: req.new_status,
            product_subtotal: req.product_subtotal,
            shipping_fee: req.shipping_fee,
            coupon_discount: req.coupon_discount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SpendOutcomeResponse {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_spent: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_tier: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_tier: Option<Amount>,
    #[serde(default)]
    pub issued: Vec<CouponResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SpendOutcomeResponse {
    fn bare(outcome: &SpendOutcome) -> Self {
        Self {
            outcome: outcome.label().to_string(),
            customer_id: None,
            amount: None,
            total_spent: None,
            old_tier: None,
            new_tier: None,
            issued: Vec::new(),
            reason: None,
        }
    }

    pub fn new(outcome: SpendOutcome, now: DateTime<Utc>) -> Self {
        let mut response = Self::bare(&outcome);
        match outcome {
            SpendOutcome::Ignored | SpendOutcome::UnknownCustomer => {}
            SpendOutcome::AlreadyCredited {
                customer_id,
                issued,
            } => {
                response.customer_id = Some(customer_id);
                response.issued = issued
                    .into_iter()
                    .map(|c| CouponResponse::new(c, now))
                    .collect();
            }
            SpendOutcome::Credited {
                customer_id,
                amount,
                total_spent,
                old_tier,
                new_tier,
                issued,
            } => {
                response.customer_id = Some(customer_id);
                response.amount = Some(amount);
                response.total_spent = Some(total_spent);
                response.old_tier = Some(old_tier);
                response.new_tier = Some(new_tier);
                response.issued = issued
                    .into_iter()
                    .map(|c| CouponResponse::new(c, now))
                    .collect();
            }
            SpendOutcome::Failed { reason } => {
                response.reason = Some(reason);
            }
        }
        response
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CouponCheckRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(min = 1, max = 64))]
    pub customer_identifier: String,
    #[validate(range(min = 0, max = MAX_AMOUNT))]
    pub order_subtotal: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CouponCheckResponse {
    pub eligible: bool,
    pub discount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
