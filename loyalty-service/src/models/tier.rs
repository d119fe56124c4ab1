use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Currency amount in whole units. The storefront prices in VND, which has no
/// minor unit.
pub type Amount = i64;

/// Tier level of a customer who has not reached any threshold.
pub const NO_TIER: Amount = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDefinition {
    /// Cumulative spend needed to reach the tier. Also the tier's level.
    pub threshold: Amount,
    /// Face value of the coupon issued on reaching the tier.
    pub discount: Amount,
    pub name: String,
}

impl TierDefinition {
    pub fn new(threshold: Amount, discount: Amount, name: impl Into<String>) -> Self {
        Self {
            threshold,
            discount,
            name: name.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TierConfigError {
    #[error("tier table is empty")]
    Empty,

    #[error("tier '{name}' has non-positive threshold {threshold}")]
    NonPositiveThreshold { name: String, threshold: Amount },

    #[error("tier '{name}' has non-positive discount {discount}")]
    NonPositiveDiscount { name: String, discount: Amount },

    #[error("tier at threshold {0} has a blank name")]
    BlankName(Amount),

    #[error("thresholds must be strictly increasing: {previous} is followed by {next}")]
    NotIncreasing { previous: Amount, next: Amount },

    #[error("malformed tier entry '{0}', expected threshold:discount:name")]
    Malformed(String),
}

/// Ordered, validated tier thresholds. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TierDefinition>", into = "Vec<TierDefinition>")]
pub struct TierTable {
    tiers: Vec<TierDefinition>,
}

impl TierTable {
    pub fn new(tiers: Vec<TierDefinition>) -> Result<Self, TierConfigError> {
        if tiers.is_empty() {
            return Err(TierConfigError::Empty);
        }

        for tier in &tiers {
            if tier.name.trim().is_empty() {
                return Err(TierConfigError::BlankName(tier.threshold));
            }
            if tier.threshold <= 0 {
                return Err(TierConfigError::NonPositiveThreshold {
                    name: tier.name.clone(),
                    threshold: tier.threshold,
                });
            }
            if tier.discount <= 0 {
                return Err(TierConfigError::NonPositiveDiscount {
                    name: tier.name.clone(),
                    discount: tier.discount,
                });
            }
        }

        if let Some(pair) = tiers
            .windows(2)
            .find(|pair| pair[0].threshold >= pair[1].threshold)
        {
            return Err(TierConfigError::NotIncreasing {
                previous: pair[0].threshold,
                next: pair[1].threshold,
            });
        }

        Ok(Self { tiers })
    }

    /// Parse `threshold:discount:name` entries separated by commas.
    pub fn parse(raw: &str) -> Result<Self, TierConfigError> {
        let tiers = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let mut parts = entry.splitn(3, ':');
                let threshold = parts.next().and_then(|p| p.trim().parse().ok());
                let discount = parts.next().and_then(|p| p.trim().parse().ok());
                let name = parts.next().map(str::trim);
                match (threshold, discount, name) {
                    (Some(threshold), Some(discount), Some(name)) => {
                        Ok(TierDefinition::new(threshold, discount, name))
                    }
                    _ => Err(TierConfigError::Malformed(entry.to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(tiers)
    }

    /// Highest threshold not above `total_spent`, or [`NO_TIER`].
    pub fn resolve(&self, total_spent: Amount) -> Amount {
        self.tiers
            .iter()
            .rev()
            .find(|tier| tier.threshold <= total_spent)
            .map_or(NO_TIER, |tier| tier.threshold)
    }

    /// Tiers with `old_level < threshold <= new_level`, ascending.
    pub fn crossed(
        &self,
        old_level: Amount,
        new_level: Amount,
    ) -> impl Iterator<Item = &TierDefinition> + '_ {
        self.tiers
            .iter()
            .filter(move |tier| tier.threshold > old_level && tier.threshold <= new_level)
    }

    /// Tiers at or below `level`, ascending.
    pub fn reached(&self, level: Amount) -> impl Iterator<Item = &TierDefinition> + '_ {
        self.crossed(NO_TIER, level)
    }

    /// First tier strictly above `total_spent`.
    pub fn next_after(&self, total_spent: Amount) -> Option<&TierDefinition> {
        self.tiers.iter().find(|tier| tier.threshold > total_spent)
    }

    pub fn definition(&self, level: Amount) -> Option<&TierDefinition> {
        self.tiers.iter().find(|tier| tier.threshold == level)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TierDefinition> {
        self.tiers.iter()
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiers: vec![
                TierDefinition::new(500_000, 50_000, "Silver"),
                TierDefinition::new(1_000_000, 100_000, "Gold"),
                TierDefinition::new(2_000_000, 200_000, "Diamond"),
            ],
        }
    }
}

impl TryFrom<Vec<TierDefinition>> for TierTable {
    type Error = TierConfigError;

    fn try_from(tiers: Vec<TierDefinition>) -> Result<Self, Self::Error> {
        Self::new(tiers)
    }
}

impl From<TierTable> for Vec<TierDefinition> {
    fn from(table: TierTable) -> Self {
        table.tiers
    }
}
