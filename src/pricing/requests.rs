//! Request DTOs for pricing API endpoints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::models::{TierInput, TierKind};

/// Query for the price preview table
#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

/// Request to price a single duration
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub duration_minutes: i32,
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

/// Request to supersede the current rate of a room or upgrade
#[derive(Debug, Deserialize)]
pub struct UpdateRateRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    /// Defaults to now
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
}

/// Body for creating or replacing a tier
#[derive(Debug, Deserialize)]
pub struct TierRequest {
    pub from_minutes: i32,
    #[serde(default)]
    pub to_minutes: Option<i32>,
    pub kind: TierKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    #[serde(default)]
    pub sort_order: i32,
}

impl From<TierRequest> for TierInput {
    fn from(req: TierRequest) -> Self {
        TierInput {
            from_minutes: req.from_minutes,
            to_minutes: req.to_minutes,
            kind: req.kind,
            rate: req.rate,
            sort_order: req.sort_order,
        }
    }
}
