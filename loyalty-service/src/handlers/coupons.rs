use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{CouponCheckRequest, CouponCheckResponse, CouponResponse},
    handlers::customers::find_customer,
    AppState,
};

pub async fn get_coupon(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CouponResponse>, AppError> {
    let coupon = state
        .store
        .find_coupon_by_code(&code.trim().to_uppercase())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Coupon not found")))?;

    Ok(Json(CouponResponse::new(coupon, Utc::now())))
}

/// Whether a coupon could be applied to an order, and for how much. Read-only.
pub async fn check_coupon(
    State(state): State<AppState>,
    Json(payload): Json<CouponCheckRequest>,
) -> Result<Json<CouponCheckResponse>, AppError> {
    payload.validate()?;

    let customer = find_customer(&state, &payload.customer_identifier).await?;
    let coupon = state
        .store
        .find_coupon_by_code(&payload.code.trim().to_uppercase())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Coupon not found")))?;

    let response = match coupon.check_eligibility(&customer.id, payload.order_subtotal, Utc::now()) {
        Ok(discount) => CouponCheckResponse {
            eligible: true,
            discount,
            reason: None,
        },
        Err(rejection) => {
            tracing::debug!(code = %coupon.code, reason = %rejection, "Coupon not applicable");
            CouponCheckResponse {
                eligible: false,
                discount: 0,
                reason: Some(rejection.to_string()),
            }
        }
    };

    Ok(Json(response))
}
