use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;

use super::store::{CouponInsertError, CouponStore, CustomerStore, LoyaltyStore};
use crate::models::{Amount, Coupon, CouponStatus, Customer};

const DUPLICATE_KEY: i32 = 11000;
const CUSTOMER_IDENTIFIER_INDEX: &str = "identifier_unique_idx";
const COUPON_CODE_INDEX: &str = "code_unique_idx";
const COUPON_OWNER_TIER_INDEX: &str = "owner_tier_unique_idx";

#[derive(Clone)]
pub struct LoyaltyDb {
    client: MongoClient,
    db: Database,
}

impl LoyaltyDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub fn customers(&self) -> Collection<Customer> {
        self.db.collection("customers")
    }

    pub fn coupons(&self) -> Collection<Coupon> {
        self.db.collection("coupons")
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for loyalty-service");

        let identifier_index = IndexModel::builder()
            .keys(doc! { "identifier": 1 })
            .options(
                IndexOptions::builder()
                    .name(CUSTOMER_IDENTIFIER_INDEX.to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.customers()
            .create_index(identifier_index, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create customer identifier index: {}", e);
                AppError::from(e)
            })?;

        // Guarantor of code uniqueness; the pre-insert existence check is advisory.
        let code_index = IndexModel::builder()
            .keys(doc! { "code": 1 })
            .options(
                IndexOptions::builder()
                    .name(COUPON_CODE_INDEX.to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        // One tier coupon per customer per threshold. Partial so coupons without
        // a tier level are unconstrained.
        let owner_tier_index = IndexModel::builder()
            .keys(doc! { "owner_id": 1, "tier_level": 1 })
            .options(
                IndexOptions::builder()
                    .name(COUPON_OWNER_TIER_INDEX.to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "tier_level": { "$exists": true } })
                    .build(),
            )
            .build();

        let expiry_index = IndexModel::builder()
            .keys(doc! { "status": 1, "expires_utc": 1 })
            .options(
                IndexOptions::builder()
                    .name("status_expiry_idx".to_string())
                    .build(),
            )
            .build();

        self.coupons()
            .create_indexes([code_index, owner_tier_index, expiry_index], None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create coupon indexes: {}", e);
                AppError::from(e)
            })?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }
}

/// Index name named in a duplicate-key write error, if that is what `err` is.
fn duplicate_key_index(err: &MongoError) -> Option<&str> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY =>
        {
            [
                CUSTOMER_IDENTIFIER_INDEX,
                COUPON_CODE_INDEX,
                COUPON_OWNER_TIER_INDEX,
            ]
            .into_iter()
            .find(|index| write_error.message.contains(index))
            .or(Some(""))
        }
        _ => None,
    }
}

#[async_trait]
impl CustomerStore for LoyaltyDb {
    async fn find_customer_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Customer>, AppError> {
        // The credited order ids are only consulted by the credit filter.
        let options = FindOneOptions::builder()
            .projection(doc! { "credited_orders": 0 })
            .build();

        self.customers()
            .find_one(doc! { "identifier": identifier }, options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to find customer: {}", e);
                AppError::from(e)
            })
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<(), AppError> {
        match self.customers().insert_one(customer, None).await {
            Ok(_) => Ok(()),
            Err(e) if duplicate_key_index(&e).is_some() => Err(AppError::Conflict(
                anyhow::anyhow!("Customer '{}' already exists", customer.identifier),
            )),
            Err(e) => {
                tracing::error!("Failed to insert customer: {}", e);
                Err(AppError::from(e))
            }
        }
    }

    async fn credit_order(
        &self,
        customer_id: &str,
        order_id: &str,
        amount: Amount,
    ) -> Result<Option<Customer>, AppError> {
        // Conditional increment: the filter refuses an order already in the
        // credited list, so retries cannot double-count.
        let filter = doc! {
            "_id": customer_id,
            "credited_orders": { "$ne": order_id },
        };
        let update = doc! {
            "$inc": { "total_spent": amount },
            "$push": { "credited_orders": order_id },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .projection(doc! { "credited_orders": 0 })
            .build();

        self.customers()
            .find_one_and_update(filter, update, options)
            .await
            .map_err(|e| {
                tracing::error!(customer_id = %customer_id, order_id = %order_id, "Failed to credit order: {}", e);
                AppError::from(e)
            })
    }

    async fn raise_tier_level(
        &self,
        customer_id: &str,
        tier_level: Amount,
    ) -> Result<(), AppError> {
        self.customers()
            .update_one(
                doc! { "_id": customer_id },
                doc! { "$max": { "tier_level": tier_level } },
                None,
            )
            .await
            .map_err(|e| {
                tracing::error!(customer_id = %customer_id, "Failed to update tier level: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }
}

#[async_trait]
impl CouponStore for LoyaltyDb {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<(), CouponInsertError> {
        match self.coupons().insert_one(coupon, None).await {
            Ok(_) => Ok(()),
            Err(e) => match duplicate_key_index(&e) {
                Some(COUPON_OWNER_TIER_INDEX) => Err(CouponInsertError::DuplicateTier),
                Some(_) => Err(CouponInsertError::DuplicateCode),
                None => {
                    tracing::error!("Failed to insert coupon: {}", e);
                    Err(CouponInsertError::Store(AppError::from(e)))
                }
            },
        }
    }

    async fn coupon_code_exists(&self, code: &str) -> Result<bool, AppError> {
        let count = self
            .coupons()
            .count_documents(doc! { "code": code }, None)
            .await?;
        Ok(count > 0)
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError> {
        Ok(self.coupons().find_one(doc! { "code": code }, None).await?)
    }

    async fn find_coupon_for_tier(
        &self,
        owner_id: &str,
        tier_level: Amount,
    ) -> Result<Option<Coupon>, AppError> {
        Ok(self
            .coupons()
            .find_one(doc! { "owner_id": owner_id, "tier_level": tier_level }, None)
            .await?)
    }

    async fn list_coupons_for_owner(&self, owner_id: &str) -> Result<Vec<Coupon>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_utc": -1 })
            .build();

        let cursor = self
            .coupons()
            .find(doc! { "owner_id": owner_id }, options)
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn expire_overdue_coupons(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let active = mongodb::bson::to_bson(&CouponStatus::Active)?;
        let expired = mongodb::bson::to_bson(&CouponStatus::Expired)?;

        let result = self
            .coupons()
            .update_many(
                doc! {
                    "status": active,
                    "expires_utc": { "$lte": BsonDateTime::from_chrono(now) },
                },
                doc! { "$set": { "status": expired } },
                None,
            )
            .await?;

        Ok(result.modified_count)
    }
}

#[async_trait]
impl LoyaltyStore for LoyaltyDb {
    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }
}
