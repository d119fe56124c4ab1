//! Spend attribution and tier-reward coupon issuance.
//!
//! An order reaching `delivered` adds its goods amount to the owner's
//! cumulative spend. Every tier threshold the new total crosses earns one
//! fixed-amount coupon. Issuance is idempotent per `(customer, threshold)` and
//! codes are unique; both rules are ultimately enforced by the store.

use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;

use super::codes::CodeGenerator;
use super::metrics::{
    record_code_collision, record_coupon_issued, record_coupons_expired, record_order_event,
};
use super::store::{CouponInsertError, LoyaltyStore};
use crate::models::{
    normalize_identifier, Amount, Coupon, Customer, OrderStatusChange, TierDefinition, TierTable,
};

/// Terms attached to every tier-reward coupon.
#[derive(Debug, Clone)]
pub struct CouponPolicy {
    /// Order subtotal below which a coupon cannot be applied, whatever its tier.
    pub min_order_value: Amount,
    pub validity: Duration,
    /// Code draws before issuance gives up.
    pub max_code_attempts: u32,
}

impl Default for CouponPolicy {
    fn default() -> Self {
        Self {
            min_order_value: 200_000,
            validity: Duration::days(30),
            max_code_attempts: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SpendOutcome {
    /// Not an edge into `delivered`.
    Ignored,
    /// No account matches the order's customer identifier.
    UnknownCustomer,
    /// The order was credited by an earlier invocation. `issued` holds tier
    /// coupons that invocation failed to issue and this one made up for.
    AlreadyCredited {
        customer_id: String,
        issued: Vec<Coupon>,
    },
    Credited {
        customer_id: String,
        amount: Amount,
        total_spent: Amount,
        old_tier: Amount,
        new_tier: Amount,
        issued: Vec<Coupon>,
    },
    /// Persistence failed; the order's own transition stands.
    Failed { reason: String },
}

impl SpendOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SpendOutcome::Ignored => "ignored",
            SpendOutcome::UnknownCustomer => "unknown_customer",
            SpendOutcome::AlreadyCredited { .. } => "already_credited",
            SpendOutcome::Credited { .. } => "credited",
            SpendOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone)]
pub struct TierEngine {
    store: Arc<dyn LoyaltyStore>,
    tiers: Arc<TierTable>,
    codes: Arc<dyn CodeGenerator>,
    policy: CouponPolicy,
}

impl TierEngine {
    pub fn new(
        store: Arc<dyn LoyaltyStore>,
        tiers: TierTable,
        codes: Arc<dyn CodeGenerator>,
        policy: CouponPolicy,
    ) -> Self {
        Self {
            store,
            tiers: Arc::new(tiers),
            codes,
            policy,
        }
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn store(&self) -> &Arc<dyn LoyaltyStore> {
        &self.store
    }

    /// Best-effort entry point for the order-update path: failures are logged
    /// and reported as [`SpendOutcome::Failed`], never propagated.
    pub async fn on_order_status_changed(&self, change: &OrderStatusChange) -> SpendOutcome {
        let outcome = match self.handle_status_change(change, Utc::now()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    order_id = %change.order_id,
                    error = %e,
                    "Spend tracking failed; order transition is unaffected"
                );
                SpendOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        record_order_event(outcome.label());
        outcome
    }

    pub async fn handle_status_change(
        &self,
        change: &OrderStatusChange,
        now: DateTime<Utc>,
    ) -> Result<SpendOutcome, AppError> {
        if !change.is_fulfillment() {
            tracing::debug!(
                order_id = %change.order_id,
                previous = %change.previous_status,
                new = %change.new_status,
                "Status change does not fulfil the order"
            );
            return Ok(SpendOutcome::Ignored);
        }

        let identifier = normalize_identifier(&change.customer_identifier);
        let Some(customer) = self.store.find_customer_by_identifier(&identifier).await? else {
            tracing::info!(order_id = %change.order_id, "No customer for fulfilled order");
            return Ok(SpendOutcome::UnknownCustomer);
        };

        let amount = change.attributable_amount();
        let Some(updated) = self
            .store
            .credit_order(&customer.id, &change.order_id, amount)
            .await?
        else {
            // A previous attempt may have stopped after the credit.
            let issued = self.settle_tiers(&customer, now).await?;
            tracing::info!(
                order_id = %change.order_id,
                customer_id = %customer.id,
                coupons_issued = issued.len(),
                "Order already credited"
            );
            return Ok(SpendOutcome::AlreadyCredited {
                customer_id: customer.id,
                issued,
            });
        };

        let total_spent = updated.total_spent;
        let old_tier = self.tiers.resolve(total_spent - amount);
        let new_tier = self.tiers.resolve(total_spent);

        self.store.raise_tier_level(&updated.id, new_tier).await?;

        let mut issued = Vec::new();
        for tier in self.tiers.crossed(old_tier, new_tier) {
            if let Some(coupon) = self.issue_tier_coupon(&updated.id, tier, now).await? {
                issued.push(coupon);
            }
        }

        tracing::info!(
            order_id = %change.order_id,
            customer_id = %updated.id,
            amount,
            total_spent,
            old_tier,
            new_tier,
            coupons_issued = issued.len(),
            "Order spend credited"
        );

        Ok(SpendOutcome::Credited {
            customer_id: updated.id,
            amount,
            total_spent,
            old_tier,
            new_tier,
            issued,
        })
    }

    /// Issue the coupon for `tier` unless the customer already holds one.
    /// Returns `None` when nothing new was issued.
    pub async fn issue_tier_coupon(
        &self,
        owner_id: &str,
        tier: &TierDefinition,
        now: DateTime<Utc>,
    ) -> Result<Option<Coupon>, AppError> {
        if self
            .store
            .find_coupon_for_tier(owner_id, tier.threshold)
            .await?
            .is_some()
        {
            tracing::debug!(owner_id = %owner_id, tier = %tier.name, "Tier coupon already issued");
            return Ok(None);
        }

        for attempt in 1..=self.policy.max_code_attempts {
            let code = self.codes.generate();

            if self.store.coupon_code_exists(&code).await? {
                record_code_collision();
                tracing::warn!(attempt, "Coupon code collision, drawing again");
                continue;
            }

            let coupon = Coupon::tier_reward(
                code,
                owner_id,
                tier,
                self.policy.min_order_value,
                self.policy.validity,
                now,
            );

            match self.store.insert_coupon(&coupon).await {
                Ok(()) => {
                    record_coupon_issued(&tier.name);
                    tracing::info!(
                        owner_id = %owner_id,
                        tier = %tier.name,
                        code = %coupon.code,
                        value = coupon.value,
                        "Tier coupon issued"
                    );
                    return Ok(Some(coupon));
                }
                Err(CouponInsertError::DuplicateCode) => {
                    record_code_collision();
                    tracing::warn!(attempt, "Coupon code taken at insert, drawing again");
                }
                Err(CouponInsertError::DuplicateTier) => {
                    tracing::info!(
                        owner_id = %owner_id,
                        tier = %tier.name,
                        "Tier coupon issued concurrently"
                    );
                    return Ok(None);
                }
                Err(CouponInsertError::Store(e)) => return Err(e),
            }
        }

        Err(AppError::InternalError(anyhow::anyhow!(
            "No unique coupon code after {} attempts",
            self.policy.max_code_attempts
        )))
    }

    /// Issue any coupon missing for the thresholds the customer's spend has
    /// reached, repairing a stale tier level on the way.
    pub async fn reconcile_coupons(&self, identifier: &str) -> Result<Vec<Coupon>, AppError> {
        let identifier = normalize_identifier(identifier);
        let customer = self
            .store
            .find_customer_by_identifier(&identifier)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Customer not found")))?;

        let issued = self.settle_tiers(&customer, Utc::now()).await?;
        if !issued.is_empty() {
            tracing::info!(
                customer_id = %customer.id,
                coupons_issued = issued.len(),
                "Reconciled missing tier coupons"
            );
        }
        Ok(issued)
    }

    /// Derive the tier from recorded spend, persist it if the stored level
    /// lags, and issue every reached tier's coupon not yet held. Repeatable.
    async fn settle_tiers(
        &self,
        customer: &Customer,
        now: DateTime<Utc>,
    ) -> Result<Vec<Coupon>, AppError> {
        let level = self.tiers.resolve(customer.total_spent);
        if level > customer.tier_level {
            tracing::warn!(
                customer_id = %customer.id,
                stored = customer.tier_level,
                level,
                "Stored tier level lags spend, raising"
            );
            self.store.raise_tier_level(&customer.id, level).await?;
        }

        let mut issued = Vec::new();
        for tier in self.tiers.reached(level) {
            if let Some(coupon) = self.issue_tier_coupon(&customer.id, tier, now).await? {
                issued.push(coupon);
            }
        }
        Ok(issued)
    }

    pub async fn expire_overdue_coupons(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let expired = self.store.expire_overdue_coupons(now).await?;
        if expired > 0 {
            record_coupons_expired(expired);
            tracing::info!(expired, "Expired overdue coupons");
        }
        Ok(expired)
    }
}
