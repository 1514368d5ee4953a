//! Billing route handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::error::Result;
use crate::AppState;

use super::models::Billing;
use super::requests::GenerateBillingsRequest;
use super::responses::{BillingSummary, GenerateBillingsResponse};
use super::services;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/billings/generate", post(generate))
        .route("/api/billings", get(list_billings))
        .route("/api/billings/:billing_id", get(get_billing))
        .route("/api/providers/:provider_id/billings", get(provider_billings))
}

pub async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateBillingsRequest>,
) -> Result<(StatusCode, Json<GenerateBillingsResponse>)> {
    let billings = services::generate_billings(
        state.store.as_ref(),
        &req.booking_ids,
        req.period_start,
        req.period_end,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(billings.into())))
}

pub async fn list_billings(State(state): State<AppState>) -> Result<Json<Vec<BillingSummary>>> {
    let billings = services::list_billings(state.store.as_ref()).await?;
    Ok(Json(billings.iter().map(BillingSummary::from).collect()))
}

pub async fn get_billing(
    State(state): State<AppState>,
    Path(billing_id): Path<Uuid>,
) -> Result<Json<Billing>> {
    let billing = services::get_billing(state.store.as_ref(), billing_id).await?;
    Ok(Json(billing))
}

pub async fn provider_billings(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Vec<BillingSummary>>> {
    let billings = services::list_billings_for_provider(state.store.as_ref(), provider_id).await?;
    Ok(Json(billings.iter().map(BillingSummary::from).collect()))
}
