use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tier::{Amount, NO_TIER};

/// A storefront account as far as spend tracking is concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: String,
    /// Reference carried by orders (the contact phone number).
    pub identifier: String,
    pub name: String,
    pub total_spent: Amount,
    pub tier_level: Amount,
    /// Orders already attributed to `total_spent`.
    #[serde(default)]
    pub credited_orders: Vec<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_utc: DateTime<Utc>,
}

impl Customer {
    pub fn new(identifier: &str, name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            identifier: normalize_identifier(identifier),
            name: name.trim().to_string(),
            total_spent: 0,
            tier_level: NO_TIER,
            credited_orders: Vec::new(),
            created_utc: Utc::now(),
        }
    }

    pub fn has_credited(&self, order_id: &str) -> bool {
        self.credited_orders.iter().any(|id| id == order_id)
    }
}

/// Identifiers arrive from checkout forms; surrounding whitespace is noise.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_string()
}
