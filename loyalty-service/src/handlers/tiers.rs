use axum::{extract::State, Json};

use crate::dtos::TierResponse;
use crate::AppState;

pub async fn list_tiers(State(state): State<AppState>) -> Json<Vec<TierResponse>> {
    Json(state.engine.tiers().iter().map(TierResponse::from).collect())
}
