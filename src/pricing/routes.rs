//! Pricing route handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::AppState;

use super::models::{PriceTarget, PriceTier};
use super::requests::{PreviewQuery, QuoteRequest, TierRequest, UpdateRateRequest};
use super::responses::{PreviewResponse, PriceResponse, QuoteResponse};
use super::services;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/rooms/:room_id/price-preview", get(price_preview))
        .route("/api/rooms/:room_id/quote", post(quote))
        .route("/api/rooms/:room_id/rate", post(update_room_rate))
        .route("/api/upgrades/:upgrade_id/rate", post(update_upgrade_rate))
        .route("/api/prices/:price_id/tiers", get(list_tiers).post(create_tier))
        .route("/api/tiers/:tier_id", put(update_tier).delete(delete_tier))
}

/// Durations table for the booking form
pub async fn price_preview(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<PreviewResponse>> {
    let at = query.as_of.unwrap_or_else(Utc::now);
    let result = services::preview(state.store.as_ref(), &state.cache, room_id, at).await?;
    Ok(Json(result.into()))
}

pub async fn quote(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>> {
    let at = req.as_of.unwrap_or_else(Utc::now);
    let result = services::quote(
        state.store.as_ref(),
        &state.cache,
        room_id,
        req.duration_minutes,
        at,
    )
    .await?;
    Ok(Json(result.into()))
}

pub async fn update_room_rate(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<UpdateRateRequest>,
) -> Result<(StatusCode, Json<PriceResponse>)> {
    set_rate(&state, PriceTarget::Room(room_id), req).await
}

pub async fn update_upgrade_rate(
    State(state): State<AppState>,
    Path(upgrade_id): Path<Uuid>,
    Json(req): Json<UpdateRateRequest>,
) -> Result<(StatusCode, Json<PriceResponse>)> {
    set_rate(&state, PriceTarget::Upgrade(upgrade_id), req).await
}

async fn set_rate(
    state: &AppState,
    target: PriceTarget,
    req: UpdateRateRequest,
) -> Result<(StatusCode, Json<PriceResponse>)> {
    let valid_from = req.valid_from.unwrap_or_else(Utc::now);
    let price = services::update_rate(state.store.as_ref(), target, req.rate, valid_from).await?;
    Ok((StatusCode::CREATED, Json(price.into())))
}

pub async fn list_tiers(
    State(state): State<AppState>,
    Path(price_id): Path<Uuid>,
) -> Result<Json<Vec<PriceTier>>> {
    let tiers = services::list_tiers(state.store.as_ref(), price_id).await?;
    Ok(Json(tiers))
}

pub async fn create_tier(
    State(state): State<AppState>,
    Path(price_id): Path<Uuid>,
    Json(req): Json<TierRequest>,
) -> Result<(StatusCode, Json<PriceTier>)> {
    let tier =
        services::create_tier(state.store.as_ref(), &state.cache, price_id, req.into()).await?;
    Ok((StatusCode::CREATED, Json(tier)))
}

pub async fn update_tier(
    State(state): State<AppState>,
    Path(tier_id): Path<Uuid>,
    Json(req): Json<TierRequest>,
) -> Result<Json<PriceTier>> {
    let tier =
        services::update_tier(state.store.as_ref(), &state.cache, tier_id, req.into()).await?;
    Ok(Json(tier))
}

pub async fn delete_tier(
    State(state): State<AppState>,
    Path(tier_id): Path<Uuid>,
) -> Result<StatusCode> {
    services::delete_tier(state.store.as_ref(), &state.cache, tier_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
