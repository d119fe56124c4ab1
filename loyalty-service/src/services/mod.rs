pub mod codes;
pub mod database;
pub mod engine;
pub mod memory;
pub mod metrics;
pub mod store;

pub use codes::{CodeGenerator, RandomCodeGenerator};
pub use database::LoyaltyDb;
pub use engine::{CouponPolicy, SpendOutcome, TierEngine};
pub use memory::InMemoryLoyaltyStore;
pub use metrics::{get_metrics, init_metrics};
pub use store::{CouponInsertError, CouponStore, CustomerStore, LoyaltyStore};
