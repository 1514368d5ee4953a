//! Response DTOs for pricing API endpoints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::calculators::PricePreview;
use super::models::{Price, PriceTier};
use super::services::{PreviewResult, QuoteResult};

/// Price record as returned by the API
#[derive(Debug, Serialize)]
pub struct PriceResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl From<Price> for PriceResponse {
    fn from(price: Price) -> Self {
        Self {
            id: price.id,
            owner_id: price.owner_id,
            rate: price.rate,
            valid_from: price.valid_from,
            valid_to: price.valid_to,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub room_price_id: Uuid,
    #[serde(with = "rust_decimal::serde::str")]
    pub base_rate: Decimal,
    pub duration_minutes: i32,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub tier_count: usize,
}

impl From<QuoteResult> for QuoteResponse {
    fn from(result: QuoteResult) -> Self {
        Self {
            room_price_id: result.room_price.id,
            base_rate: result.room_price.rate,
            duration_minutes: result.duration_minutes,
            amount: result.amount,
            tier_count: result.tier_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PreviewRow {
    pub duration_minutes: i32,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

impl From<PricePreview> for PreviewRow {
    fn from(row: PricePreview) -> Self {
        Self {
            duration_minutes: row.duration_minutes,
            amount: row.amount,
        }
    }
}

/// Preview table plus the price and tiers it was computed from
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub room_price: PriceResponse,
    pub tiers: Vec<PriceTier>,
    pub rows: Vec<PreviewRow>,
}

impl From<PreviewResult> for PreviewResponse {
    fn from(result: PreviewResult) -> Self {
        Self {
            room_price: result.room_price.into(),
            tiers: result.tiers,
            rows: result.rows.into_iter().map(PreviewRow::from).collect(),
        }
    }
}
