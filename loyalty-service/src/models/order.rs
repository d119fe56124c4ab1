use serde::{Deserialize, Serialize};

use super::tier::Amount;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Confirmed => write!(f, "confirmed"),
            OrderStatus::Shipping => write!(f, "shipping"),
            OrderStatus::Delivered => write!(f, "delivered"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// An order moving between states, as reported by the order-update path.
#[derive(Debug, Clone)]
pub struct OrderStatusChange {
    pub order_id: String,
    pub customer_identifier: String,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    pub product_subtotal: Amount,
    pub shipping_fee: Amount,
    pub coupon_discount: Amount,
}

impl OrderStatusChange {
    /// Only the edge into `delivered` attributes spend.
    pub fn is_fulfillment(&self) -> bool {
        self.new_status == OrderStatus::Delivered && self.previous_status != OrderStatus::Delivered
    }

    /// Amount paid for goods: subtotal less any coupon discount. Shipping is
    /// never attributed.
    pub fn attributable_amount(&self) -> Amount {
        self.product_subtotal
            .saturating_sub(self.coupon_discount)
            .max(0)
    }
}
