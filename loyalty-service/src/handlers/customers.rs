//! Customer spend records and their coupons.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{CouponResponse, CustomerResponse, RegisterCustomerRequest},
    models::{normalize_identifier, Customer},
    AppState,
};

pub async fn register_customer(
    State(state): State<AppState>,
    Json(payload): Json<RegisterCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerResponse>), AppError> {
    payload.validate()?;

    let customer = Customer::new(&payload.identifier, &payload.name);
    if customer.identifier.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Customer identifier must not be blank"
        )));
    }

    tracing::info!(customer_id = %customer.id, "Registering customer");
    state.store.insert_customer(&customer).await?;

    Ok((
        StatusCode::CREATED,
        Json(CustomerResponse::new(customer, state.engine.tiers())),
    ))
}

pub async fn get_customer(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<CustomerResponse>, AppError> {
    let customer = find_customer(&state, &identifier).await?;
    Ok(Json(CustomerResponse::new(customer, state.engine.tiers())))
}

pub async fn list_customer_coupons(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<Vec<CouponResponse>>, AppError> {
    let customer = find_customer(&state, &identifier).await?;
    let now = Utc::now();

    let coupons = state
        .store
        .list_coupons_for_owner(&customer.id)
        .await?
        .into_iter()
        .map(|coupon| CouponResponse::new(coupon, now))
        .collect();

    Ok(Json(coupons))
}

/// Issue any tier coupon the customer should hold but does not, e.g. after a
/// failed issuance.
pub async fn reconcile_customer_coupons(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<Vec<CouponResponse>>, AppError> {
    let issued = state.engine.reconcile_coupons(&identifier).await?;
    let now = Utc::now();
    Ok(Json(
        issued
            .into_iter()
            .map(|coupon| CouponResponse::new(coupon, now))
            .collect(),
    ))
}

pub(crate) async fn find_customer(state: &AppState, identifier: &str) -> Result<Customer, AppError> {
    state
        .store
        .find_customer_by_identifier(&normalize_identifier(identifier))
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Customer not found")))
}
