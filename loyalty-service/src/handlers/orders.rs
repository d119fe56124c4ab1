use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{OrderStatusChangeRequest, SpendOutcomeResponse},
    models::OrderStatusChange,
    AppState,
};

/// Intake for order status changes from the storefront's order-update path.
///
/// Answers 202 whatever the spend-tracking outcome: the order's transition has
/// already happened and is never undone here.
pub async fn order_status_changed(
    State(state): State<AppState>,
    Json(payload): Json<OrderStatusChangeRequest>,
) -> Result<(StatusCode, Json<SpendOutcomeResponse>), AppError> {
    payload.validate()?;

    let change = OrderStatusChange::from(payload);
    tracing::info!(
        order_id = %change.order_id,
        previous = %change.previous_status,
        new = %change.new_status,
        "Order status changed"
    );

    let outcome = state.engine.on_order_status_changed(&change).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(SpendOutcomeResponse::new(outcome, Utc::now())),
    ))
}
