pub mod coupon;
pub mod customer;
pub mod order;
pub mod tier;

pub use coupon::{Coupon, CouponKind, CouponRejection, CouponStatus};
pub use customer::{normalize_identifier, Customer};
pub use order::{OrderStatus, OrderStatusChange};
pub use tier::{Amount, TierConfigError, TierDefinition, TierTable, NO_TIER};
