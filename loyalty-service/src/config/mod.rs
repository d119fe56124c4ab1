use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

use crate::models::{Amount, TierTable};
use crate::services::CouponPolicy;

#[derive(Debug, Clone)]
pub struct LoyaltyConfig {
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub rewards: RewardsConfig,
    pub rate_limit: RateLimitConfig,
    /// Seconds between background sweeps (coupon expiry, rate-limit eviction).
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct RewardsConfig {
    pub tiers: TierTable,
    pub coupon_prefix: String,
    pub code_length: usize,
    pub min_order_value: Amount,
    pub validity_days: i64,
    pub max_code_attempts: u32,
}

impl RewardsConfig {
    pub fn coupon_policy(&self) -> CouponPolicy {
        CouponPolicy {
            min_order_value: self.min_order_value,
            validity: chrono::Duration::days(self.validity_days),
            max_code_attempts: self.max_code_attempts,
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        let policy = CouponPolicy::default();
        Self {
            tiers: TierTable::default(),
            coupon_prefix: "SEA".to_string(),
            code_length: 6,
            min_order_value: policy.min_order_value,
            validity_days: policy.validity.num_days(),
            max_code_attempts: policy.max_code_attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_seconds: u64,
}

impl LoyaltyConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let tiers = match env::var("LOYALTY_TIERS") {
            Ok(raw) => TierTable::parse(&raw).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("LOYALTY_TIERS is invalid: {}", e))
            })?,
            Err(_) if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "LOYALTY_TIERS is required in production but not set"
                )))
            }
            Err(_) => TierTable::default(),
        };

        let rewards = RewardsConfig {
            tiers,
            coupon_prefix: get_env("LOYALTY_COUPON_PREFIX", Some("SEA"), is_prod)?,
            code_length: parse_env("LOYALTY_COUPON_CODE_LENGTH", Some("6"), is_prod)?,
            min_order_value: parse_env("LOYALTY_MIN_ORDER_VALUE", Some("200000"), is_prod)?,
            validity_days: parse_env("LOYALTY_COUPON_VALIDITY_DAYS", Some("30"), is_prod)?,
            max_code_attempts: parse_env("LOYALTY_MAX_CODE_ATTEMPTS", Some("10"), is_prod)?,
        };

        if rewards.code_length == 0 || rewards.max_code_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "coupon code length and attempts must be positive"
            )));
        }

        Ok(LoyaltyConfig {
            common: common_config,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("loyalty_db"), is_prod)?,
            },
            rewards,
            rate_limit: RateLimitConfig {
                requests: parse_env("RATE_LIMIT_REQUESTS", Some("120"), is_prod)?,
                window_seconds: parse_env("RATE_LIMIT_WINDOW_SECONDS", Some("60"), is_prod)?,
            },
            sweep_interval_seconds: parse_env("SWEEP_INTERVAL_SECONDS", Some("300"), is_prod)?,
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("{} is not a valid value: {}", key, e))
    })
}
