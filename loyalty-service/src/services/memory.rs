use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::store::{CouponInsertError, CouponStore, CustomerStore, LoyaltyStore};
use crate::models::{Amount, Coupon, CouponStatus, Customer};

/// Process-local store with the same uniqueness rules as the MongoDB indexes.
/// Backs tests and local runs without a database.
#[derive(Default)]
pub struct InMemoryLoyaltyStore {
    customers: Mutex<HashMap<String, Customer>>,
    coupons: Mutex<Vec<Coupon>>,
}

impl InMemoryLoyaltyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn customer_count(&self) -> usize {
        self.customers.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn coupon_count(&self) -> usize {
        self.coupons.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn customers(&self) -> Result<MutexGuard<'_, HashMap<String, Customer>>, AppError> {
        self.customers
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Customer store poisoned: {}", e)))
    }

    fn coupons(&self) -> Result<MutexGuard<'_, Vec<Coupon>>, AppError> {
        self.coupons
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Coupon store poisoned: {}", e)))
    }
}

#[async_trait]
impl CustomerStore for InMemoryLoyaltyStore {
    async fn find_customer_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Customer>, AppError> {
        Ok(self
            .customers()?
            .values()
            .find(|c| c.identifier == identifier)
            .cloned())
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<(), AppError> {
        let mut customers = self.customers()?;
        if customers
            .values()
            .any(|c| c.identifier == customer.identifier)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Customer '{}' already exists",
                customer.identifier
            )));
        }
        customers.insert(customer.id.clone(), customer.clone());
        Ok(())
    }

    async fn credit_order(
        &self,
        customer_id: &str,
        order_id: &str,
        amount: Amount,
    ) -> Result<Option<Customer>, AppError> {
        let mut customers = self.customers()?;
        let Some(customer) = customers.get_mut(customer_id) else {
            return Ok(None);
        };
        if customer.has_credited(order_id) {
            return Ok(None);
        }
        customer.total_spent = customer.total_spent.checked_add(amount).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Crediting {} would overflow the spend of customer {}",
                amount,
                customer_id
            ))
        })?;
        customer.credited_orders.push(order_id.to_string());
        Ok(Some(customer.clone()))
    }

    async fn raise_tier_level(
        &self,
        customer_id: &str,
        tier_level: Amount,
    ) -> Result<(), AppError> {
        if let Some(customer) = self.customers()?.get_mut(customer_id) {
            customer.tier_level = customer.tier_level.max(tier_level);
        }
        Ok(())
    }
}

#[async_trait]
impl CouponStore for InMemoryLoyaltyStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), CouponInsertError> {
        let mut coupons = self.coupons()?;
        if coupons.iter().any(|c| c.code == coupon.code) {
            return Err(CouponInsertError::DuplicateCode);
        }
        if coupon.tier_level.is_some()
            && coupons
                .iter()
                .any(|c| c.owner_id == coupon.owner_id && c.tier_level == coupon.tier_level)
        {
            return Err(CouponInsertError::DuplicateTier);
        }
        coupons.push(coupon.clone());
        Ok(())
    }

    async fn coupon_code_exists(&self, code: &str) -> Result<bool, AppError> {
        Ok(self.coupons()?.iter().any(|c| c.code == code))
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError> {
        Ok(self.coupons()?.iter().find(|c| c.code == code).cloned())
    }

    async fn find_coupon_for_tier(
        &self,
        owner_id: &str,
        tier_level: Amount,
    ) -> Result<Option<Coupon>, AppError> {
        Ok(self
            .coupons()?
            .iter()
            .find(|c| c.owner_id == owner_id && c.tier_level == Some(tier_level))
            .cloned())
    }

    async fn list_coupons_for_owner(&self, owner_id: &str) -> Result<Vec<Coupon>, AppError> {
        let mut owned: Vec<Coupon> = self
            .coupons()?
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(owned)
    }

    async fn expire_overdue_coupons(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut expired = 0;
        for coupon in self.coupons()?.iter_mut() {
            if coupon.status == CouponStatus::Active && coupon.expires_utc <= now {
                coupon.status = CouponStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl LoyaltyStore for InMemoryLoyaltyStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
